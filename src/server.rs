//! Local preview server.
//!
//! Serves `public_dir` over HTTP with `tiny_http`. Requests are resolved
//! against the site `root`, so a site configured with `root: /blog/` is
//! previewed at `http://127.0.0.1:4000/blog/`.
//!
//! Request resolution order:
//! 1. Exact file match → serve file
//! 2. Directory without trailing slash → redirect to `dir/`
//! 3. Directory with `index.html` → serve it
//! 4. Extensionless path with a matching `.html` file → serve it
//! 5. Nothing found → 404

use std::fs;
use std::io::{self, Cursor};
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tracing::{debug, warn};

/// Try the next port when the requested one is taken.
const MAX_PORT_RETRIES: u16 = 10;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Invalid listen address: {0}")]
    Address(String),
    #[error("Failed to bind after {attempts} attempts (ports {first}-{last}): {message}")]
    Bind {
        attempts: u16,
        first: u16,
        last: u16,
        message: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// How a request path maps onto the public directory.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    Redirect(String),
    NotFound,
}

pub struct PreviewServer {
    server: Server,
    addr: SocketAddr,
    public: PathBuf,
    root: String,
}

impl PreviewServer {
    /// Bind to `ip:port`, retrying on the following ports if it is in use.
    pub fn bind(ip: &str, port: u16, public: PathBuf, root: String) -> Result<Self, ServeError> {
        let interface: IpAddr = ip.parse().map_err(|_| ServeError::Address(ip.to_string()))?;
        let (server, addr) = try_bind_port(interface, port, MAX_PORT_RETRIES)?;
        Ok(Self {
            server,
            addr,
            public,
            root,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle requests until the process is stopped.
    pub fn run(&self) {
        for request in self.server.incoming_requests() {
            if let Err(err) = self.handle(request) {
                warn!(error = %err, "request failed");
            }
        }
    }

    fn handle(&self, request: Request) -> io::Result<()> {
        let resolved = resolve_request(&self.public, &self.root, request.url());
        debug!(url = request.url(), ?resolved, "request");
        match resolved {
            Resolved::File(path) => {
                let content = fs::read(&path)?;
                let response = Response::from_data(content)
                    .with_header(header("Content-Type", guess_content_type(&path))?);
                request.respond(response)
            }
            Resolved::Redirect(location) => {
                let response = Response::empty(StatusCode(301))
                    .with_header(header("Location", &location)?);
                request.respond(response)
            }
            Resolved::NotFound => {
                let response = Response::new(
                    StatusCode(404),
                    vec![header("Content-Type", "text/plain; charset=utf-8")?],
                    Cursor::new("404 Not Found"),
                    Some(13),
                    None,
                );
                request.respond(response)
            }
        }
    }
}

fn header(name: &str, value: &str) -> io::Result<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes())
        .map_err(|()| io::Error::other(format!("invalid header value for {name}: {value}")))
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr), ServeError> {
    let mut last_error = String::new();
    let mut last_port = base_port;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        last_port = port;
        let addr = SocketAddr::new(interface, port);
        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    warn!(requested = base_port, port, "port in use, using the next free one");
                }
                return Ok((server, addr));
            }
            Err(err) => last_error = err.to_string(),
        }
    }
    Err(ServeError::Bind {
        attempts: max_retries,
        first: base_port,
        last: last_port,
        message: last_error,
    })
}

/// Map a request URL onto a file under `public`.
pub fn resolve_request(public: &Path, root: &str, url: &str) -> Resolved {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let decoded = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());

    let root_prefix = root.trim_end_matches('/');
    let Some(site_path) = decoded.strip_prefix(root_prefix) else {
        return Resolved::NotFound;
    };
    if !site_path.is_empty() && !site_path.starts_with('/') {
        return Resolved::NotFound;
    }
    let relative = site_path.trim_start_matches('/');

    // No escaping the public directory.
    if Path::new(relative)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Resolved::NotFound;
    }

    let local = public.join(relative);
    if local.is_file() {
        return Resolved::File(local);
    }
    if local.is_dir() {
        if !decoded.ends_with('/') {
            return Resolved::Redirect(format!("{decoded}/"));
        }
        let index = local.join("index.html");
        if index.is_file() {
            return Resolved::File(index);
        }
        return Resolved::NotFound;
    }
    if local.extension().is_none() && !relative.is_empty() {
        let html = local.with_extension("html");
        if html.is_file() {
            return Resolved::File(html);
        }
    }
    Resolved::NotFound
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
pub fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn public() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("2020/hello")).unwrap();
        fs::write(tmp.path().join("index.html"), "home").unwrap();
        fs::write(tmp.path().join("2020/hello/index.html"), "post").unwrap();
        fs::write(tmp.path().join("notes.html"), "notes").unwrap();
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        tmp
    }

    #[test]
    fn root_serves_index() {
        let tmp = public();
        assert_eq!(
            resolve_request(tmp.path(), "/", "/"),
            Resolved::File(tmp.path().join("index.html"))
        );
    }

    #[test]
    fn directory_with_slash_serves_index() {
        let tmp = public();
        assert_eq!(
            resolve_request(tmp.path(), "/", "/2020/hello/?ref=x"),
            Resolved::File(tmp.path().join("2020/hello/index.html"))
        );
    }

    #[test]
    fn directory_without_slash_redirects() {
        let tmp = public();
        assert_eq!(
            resolve_request(tmp.path(), "/", "/2020/hello"),
            Resolved::Redirect("/2020/hello/".into())
        );
    }

    #[test]
    fn extensionless_falls_back_to_html() {
        let tmp = public();
        assert_eq!(
            resolve_request(tmp.path(), "/", "/notes"),
            Resolved::File(tmp.path().join("notes.html"))
        );
    }

    #[test]
    fn site_root_prefix_is_stripped() {
        let tmp = public();
        assert_eq!(
            resolve_request(tmp.path(), "/blog/", "/blog/notes.html"),
            Resolved::File(tmp.path().join("notes.html"))
        );
        assert_eq!(resolve_request(tmp.path(), "/blog/", "/notes.html"), Resolved::NotFound);
        assert_eq!(resolve_request(tmp.path(), "/blog/", "/blogx/notes.html"), Resolved::NotFound);
    }

    #[test]
    fn percent_encoding_decoded() {
        let tmp = public();
        fs::write(tmp.path().join("a b.html"), "spaced").unwrap();
        assert_eq!(
            resolve_request(tmp.path(), "/", "/a%20b.html"),
            Resolved::File(tmp.path().join("a b.html"))
        );
    }

    #[test]
    fn parent_segments_rejected() {
        let tmp = public();
        assert_eq!(resolve_request(tmp.path(), "/", "/../etc/passwd"), Resolved::NotFound);
        assert_eq!(resolve_request(tmp.path(), "/", "/%2e%2e/secret"), Resolved::NotFound);
    }

    #[test]
    fn missing_and_empty_dirs_are_404() {
        let tmp = public();
        assert_eq!(resolve_request(tmp.path(), "/", "/nope.html"), Resolved::NotFound);
        assert_eq!(resolve_request(tmp.path(), "/", "/empty/"), Resolved::NotFound);
    }

    #[test]
    fn content_types() {
        assert_eq!(guess_content_type(Path::new("a.html")), "text/html; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.css")), "text/css; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.bin")), "application/octet-stream");
    }

    #[test]
    fn bind_rejects_bad_address() {
        let err = PreviewServer::bind("not-an-ip", 4000, PathBuf::new(), "/".into()).err();
        assert!(matches!(err, Some(ServeError::Address(_))));
    }
}
