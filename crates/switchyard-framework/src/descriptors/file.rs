use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, trace};

use switchyard_core::{
    BoxError, Method, RespondOptions, ResponseHead, StatusCode, names,
};

use crate::descriptor::{PostDescriptor, PreDescriptor};
use crate::handler::Invocation;

const INDEX_FILE: &str = "index.html";
const FALLBACK_CONTENT_TYPE: &str = "text/plain";

/// Serves files below a base directory.
///
/// Symlinks are followed, but a file whose resolved location lies outside
/// the resolved base directory is never served.
#[derive(Debug, Clone)]
pub struct FileServer {
    base: PathBuf,
}

impl FileServer {
    /// Creates a server for files below `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The directory files are served from.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The path below the base directory a request path refers to.
    ///
    /// The query and fragment are dropped, as are `.` and `..` segments. The
    /// root maps to `index.html`.
    pub fn relative_path(request_path: &str) -> String {
        let path = request_path
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .collect();

        if segments.is_empty() {
            INDEX_FILE.to_string()
        } else {
            segments.join("/")
        }
    }

    async fn serve(&self, invocation: Invocation) -> Result<(), BoxError> {
        let Invocation {
            exchange,
            headers,
            context,
            ..
        } = invocation;

        if headers.method() != Some(Method::GET) || exchange.headers_sent() || context.done() {
            return Ok(());
        }
        let Some(request_path) = headers.path() else {
            return Ok(());
        };

        let relative = Self::relative_path(request_path);
        let requested = self.base.join(&relative);
        let mut head = ResponseHead::new(StatusCode::OK)
            .header(names::CONTENT_TYPE, content_type_for(&relative));

        let mut file = None;
        if accepts_gzip(headers.get(names::ACCEPT_ENCODING)) {
            let mut compressed = requested.clone().into_os_string();
            compressed.push(".gz");
            file = self.resolve(Path::new(&compressed)).await;
            if file.is_some() {
                head = head.header(names::CONTENT_ENCODING, "gzip");
            }
        }
        if file.is_none() {
            file = self.resolve(&requested).await;
        }
        let Some(file) = file else {
            trace!(file = %requested.display(), "No file to serve");
            return Ok(());
        };

        let contents = fs::read(&file).await?;
        debug!(
            stream = exchange.id(),
            file = %file.display(),
            bytes = contents.len(),
            "Serving file"
        );
        exchange.respond(head, RespondOptions::KEEP_OPEN)?;
        exchange.write(contents).await?;
        exchange.end()?;
        Ok(())
    }

    /// Resolves `path` to a regular file inside the base directory.
    async fn resolve(&self, path: &Path) -> Option<PathBuf> {
        let resolved = fs::canonicalize(path).await.ok()?;
        let base = fs::canonicalize(&self.base).await.ok()?;
        if !resolved.starts_with(&base) {
            debug!(file = %path.display(), "Refusing file outside the base directory");
            return None;
        }
        let metadata = fs::metadata(&resolved).await.ok()?;
        metadata.is_file().then_some(resolved)
    }
}

/// A pre-step serving files below `base` for `GET` exchanges.
pub fn file_pre(base: impl Into<PathBuf>) -> PreDescriptor {
    let server = Arc::new(FileServer::new(base));
    PreDescriptor::new(move |invocation: Invocation| {
        let server = Arc::clone(&server);
        async move { server.serve(invocation).await }
    })
    .named("file")
}

/// A post-step serving files below `base` for `GET` exchanges nothing else
/// answered.
pub fn file_post(base: impl Into<PathBuf>) -> PostDescriptor {
    let server = Arc::new(FileServer::new(base));
    PostDescriptor::new(move |invocation: Invocation| {
        let server = Arc::clone(&server);
        async move { server.serve(invocation).await }
    })
    .named("file")
}

/// The content type announced for `path`, derived from its extension.
///
/// Unknown or missing extensions are announced as `text/plain`.
pub fn content_type_for(path: &str) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}

fn accepts_gzip(accept_encoding: Option<&str>) -> bool {
    accept_encoding.is_some_and(|value| {
        value
            .split(',')
            .filter_map(|coding| coding.split(';').next())
            .any(|coding| coding.trim().eq_ignore_ascii_case("gzip"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use switchyard_core::{Exchange, Headers, MemoryExchange, SessionContext, StreamContext};

    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

    async fn site() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "switchyard-files-{}-{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(dir.join("css")).await.unwrap();
        fs::write(dir.join("index.html"), "<h1>home</h1>").await.unwrap();
        fs::write(dir.join("css/site.css"), "body{}").await.unwrap();
        fs::write(dir.join("css/site.css.gz"), b"\x1f\x8b").await.unwrap();
        dir
    }

    fn invocation(stream: Arc<MemoryExchange>, headers: Headers) -> Invocation {
        let context = StreamContext::promote(&SessionContext::default(), &headers);
        Invocation::new(Exchange::new(stream), Arc::new(headers), 0, context)
    }

    #[test]
    fn relative_paths_are_sanitized() {
        assert_eq!(FileServer::relative_path("/"), "index.html");
        assert_eq!(FileServer::relative_path("/../../etc/passwd"), "etc/passwd");
        assert_eq!(FileServer::relative_path("/a/./b/../c.js?v=1"), "a/b/c.js");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("index.html"), "text/html");
        assert_eq!(content_type_for("clips/intro.MP4"), "video/mp4");
        assert_eq!(content_type_for("report.csv"), "text/csv");
        assert_eq!(content_type_for("README"), "text/plain");
    }

    #[tokio::test]
    async fn serves_index_for_root() {
        let base = site().await;
        let stream = MemoryExchange::new(1);
        let headers = Headers::from([(":method", "GET"), (":path", "/")]);

        file_post(&base).handle(invocation(stream.clone(), headers)).await.unwrap();

        let head = stream.response().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers.get(names::CONTENT_TYPE), Some("text/html"));
        assert_eq!(&stream.body()[..], b"<h1>home</h1>");
        assert!(stream.is_ended());
    }

    #[tokio::test]
    async fn prefers_gzip_sibling() {
        let base = site().await;
        let stream = MemoryExchange::new(1);
        let headers = Headers::from([
            (":method", "GET"),
            (":path", "/css/site.css"),
            ("accept-encoding", "br, gzip;q=0.8"),
        ]);

        file_pre(&base).handle(invocation(stream.clone(), headers)).await.unwrap();

        let head = stream.response().unwrap();
        assert_eq!(head.headers.get(names::CONTENT_TYPE), Some("text/css"));
        assert_eq!(head.headers.get(names::CONTENT_ENCODING), Some("gzip"));
        assert_eq!(&stream.body()[..], b"\x1f\x8b");
    }

    #[tokio::test]
    async fn ignores_missing_files_and_other_methods() {
        let base = site().await;

        let stream = MemoryExchange::new(1);
        let headers = Headers::from([(":method", "GET"), (":path", "/missing.png")]);
        file_post(&base).handle(invocation(stream.clone(), headers)).await.unwrap();
        assert_eq!(stream.response_count(), 0);

        let stream = MemoryExchange::new(2);
        let headers = Headers::from([(":method", "POST"), (":path", "/")]);
        file_post(&base).handle(invocation(stream.clone(), headers)).await.unwrap();
        assert_eq!(stream.response_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn refuses_symlinks_leaving_the_base() {
        let base = site().await;
        let outside = base.with_extension("secret");
        fs::write(&outside, "token").await.unwrap();
        std::os::unix::fs::symlink(&outside, base.join("leak.txt")).unwrap();
        std::os::unix::fs::symlink(base.join("index.html"), base.join("home.html")).unwrap();

        let stream = MemoryExchange::new(1);
        let headers = Headers::from([(":method", "GET"), (":path", "/leak.txt")]);
        file_post(&base).handle(invocation(stream.clone(), headers)).await.unwrap();
        assert_eq!(stream.response_count(), 0);

        let stream = MemoryExchange::new(2);
        let headers = Headers::from([(":method", "GET"), (":path", "/home.html")]);
        file_post(&base).handle(invocation(stream.clone(), headers)).await.unwrap();
        assert_eq!(&stream.body()[..], b"<h1>home</h1>");
    }
}
