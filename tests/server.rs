use rust_fileserver::config::{AppState, Config};
use rust_fileserver::server;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    root: TempDir,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start(root: TempDir) -> Self {
        Self::start_with(root, |_| {}).await
    }

    async fn start_with(root: TempDir, tweak: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        config.server.root = root.path().to_path_buf();
        config.logging.access_log = false;
        tweak(&mut config);

        let state = Arc::new(AppState::new(config).unwrap());
        let listener = server::create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server::start_server_loop(listener, state, async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            root,
            stop: Some(stop),
            handle,
        }
    }

    async fn connect(&self) -> Client {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        Client {
            stream: BufReader::new(stream),
        }
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), &mut self.handle)
            .await
            .unwrap()
            .unwrap();
    }
}

struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn content_length(&self) -> usize {
        self.header("content-length").unwrap().parse().unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

struct Client {
    stream: BufReader<TcpStream>,
}

impl Client {
    async fn send_raw(&mut self, raw: &str) {
        self.stream.get_mut().write_all(raw.as_bytes()).await.unwrap();
    }

    async fn request(&mut self, method: &str, target: &str, extra_headers: &str) -> Response {
        self.send_raw(&format!(
            "{method} {target} HTTP/1.1\r\nHost: localhost\r\n{extra_headers}\r\n"
        ))
        .await;
        self.read_response(method == "HEAD").await
    }

    async fn get(&mut self, target: &str) -> Response {
        self.request("GET", target, "").await
    }

    async fn read_response(&mut self, head_only: bool) -> Response {
        tokio::time::timeout(IO_TIMEOUT, self.read_response_inner(head_only))
            .await
            .expect("timed out waiting for response")
    }

    async fn read_response_inner(&mut self, head_only: bool) -> Response {
        let mut status_line = String::new();
        self.stream.read_line(&mut status_line).await.unwrap();
        let status = status_line
            .split_whitespace()
            .nth(1)
            .unwrap_or_else(|| panic!("bad status line: {status_line:?}"))
            .parse()
            .unwrap();

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            self.stream.read_line(&mut line).await.unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').unwrap();
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let mut response = Response {
            status,
            headers,
            body: Vec::new(),
        };
        if !head_only && status != 304 {
            let mut body = vec![0; response.content_length()];
            self.stream.read_exact(&mut body).await.unwrap();
            response.body = body;
        }
        response
    }

    /// True once the server has closed the connection
    async fn closed_within(&mut self, limit: Duration) -> bool {
        let mut buf = Vec::new();
        matches!(
            tokio::time::timeout(limit, self.stream.read_to_end(&mut buf)).await,
            Ok(Ok(_) | Err(_))
        )
    }
}

fn tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha file\n").unwrap();
    std::fs::create_dir(dir.path().join("b")).unwrap();
    std::fs::write(dir.path().join("b/inner.html"), "<p>inner</p>").unwrap();
    dir
}

#[tokio::test]
async fn test_get_file() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    let resp = client.get("/a.txt").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.content_length(), 11);
    assert_eq!(resp.body, b"alpha file\n");
    assert_eq!(resp.header("content-type"), Some("text/plain; charset=utf-8"));
    assert!(resp.header("etag").is_some());
    assert!(resp.header("last-modified").is_some());
    assert!(resp.header("server").is_some());
    assert!(resp.header("date").is_some());

    server.shutdown().await;
}

#[tokio::test]
async fn test_if_modified_since_gives_304() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    let first = client.get("/a.txt").await;
    let last_modified = first.header("last-modified").unwrap().to_string();

    let resp = client
        .request(
            "GET",
            "/a.txt",
            &format!("If-Modified-Since: {last_modified}\r\n"),
        )
        .await;
    assert_eq!(resp.status, 304);
    assert!(resp.body.is_empty());

    // An older date still gets the file
    let resp = client
        .request(
            "GET",
            "/a.txt",
            "If-Modified-Since: Sun, 06 Nov 1994 08:49:37 GMT\r\n",
        )
        .await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"alpha file\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_if_none_match_gives_304() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    let etag = client.get("/a.txt").await.header("etag").unwrap().to_string();
    let resp = client
        .request("GET", "/a.txt", &format!("If-None-Match: {etag}\r\n"))
        .await;
    assert_eq!(resp.status, 304);
    assert_eq!(resp.header("etag"), Some(etag.as_str()));

    let resp = client
        .request("GET", "/a.txt", "If-None-Match: \"other\"\r\n")
        .await;
    assert_eq!(resp.status, 200);

    server.shutdown().await;
}

#[tokio::test]
async fn test_directory_redirect_and_listing() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    let resp = client.get("/b").await;
    assert_eq!(resp.status, 301);
    assert_eq!(resp.header("location"), Some("/b/"));

    let resp = client.get("/").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
    let html = resp.text();
    assert!(html.contains("href=\"a.txt\""));
    assert!(html.contains("href=\"b/\""));

    server.shutdown().await;
}

#[tokio::test]
async fn test_index_file_is_served() {
    let dir = tree();
    std::fs::write(dir.path().join("b/index.html"), "<h1>index</h1>").unwrap();
    let server = TestServer::start(dir).await;
    let mut client = server.connect().await;

    let resp = client.get("/b/").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "<h1>index</h1>");

    server.shutdown().await;
}

#[tokio::test]
async fn test_not_found() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    let resp = client.get("/does-not-exist").await;
    assert_eq!(resp.status, 404);
    assert!(resp.text().contains("404"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_method_not_allowed() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    let resp = client
        .request("DELETE", "/a.txt", "Content-Length: 0\r\n")
        .await;
    assert_eq!(resp.status, 405);
    assert_eq!(resp.header("allow"), Some("GET, HEAD"));
    assert!(server.root.path().join("a.txt").exists());

    server.shutdown().await;
}

#[tokio::test]
async fn test_head_matches_get_without_body() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    let head = client.request("HEAD", "/a.txt", "").await;
    assert_eq!(head.status, 200);
    assert_eq!(head.content_length(), 11);

    // No body bytes were sent, so the next response parses cleanly
    let get = client.get("/a.txt").await;
    assert_eq!(get.status, 200);
    assert_eq!(get.header("etag"), head.header("etag"));
    assert_eq!(get.body, b"alpha file\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_traversal_is_refused() {
    let outer = tempfile::tempdir().unwrap();
    std::fs::write(outer.path().join("secret.txt"), "secret").unwrap();
    let root = tempfile::tempdir_in(outer.path()).unwrap();
    let root_name = root.path().file_name().unwrap().to_string_lossy().into_owned();
    let server = TestServer::start(root).await;

    for target in [
        "/../secret.txt".to_string(),
        "/%2e%2e/secret.txt".to_string(),
        "/a/../../secret.txt".to_string(),
        format!("/..%2f..%2f{root_name}%2f..%2fsecret.txt"),
    ] {
        let mut client = server.connect().await;
        let resp = client.get(&target).await;
        assert_eq!(resp.status, 403, "{target} gave {}", resp.status);
        assert!(!resp.text().contains("secret"));
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_large_downloads() {
    let dir = tree();
    let content: Vec<u8> = (0..3_000_000u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(dir.path().join("large.bin"), &content).unwrap();
    let server = TestServer::start(dir).await;
    let content = Arc::new(content);

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let mut client = server.connect().await;
        let expected = Arc::clone(&content);
        tasks.push(tokio::spawn(async move {
            let resp = client.get("/large.bin").await;
            assert_eq!(resp.status, 200);
            assert_eq!(resp.header("content-type"), Some("application/octet-stream"));
            assert_eq!(resp.body.len(), expected.len());
            assert!(resp.body == *expected);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_pipelined_requests_answer_in_order() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    client
        .send_raw(
            "GET /a.txt HTTP/1.1\r\nHost: localhost\r\n\r\n\
             GET /b/inner.html HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await;
    let first = client.read_response(false).await;
    let second = client.read_response(false).await;
    assert_eq!(first.body, b"alpha file\n");
    assert_eq!(second.body, b"<p>inner</p>");

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_request_line() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    client.send_raw("THIS IS NOT HTTP\r\n\r\n").await;
    let resp = client.read_response(true).await;
    assert_eq!(resp.status, 400);
    assert!(client.closed_within(IO_TIMEOUT).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_connection_close_is_honored() {
    let server = TestServer::start(tree()).await;
    let mut client = server.connect().await;

    let resp = client.request("GET", "/a.txt", "Connection: close\r\n").await;
    assert_eq!(resp.status, 200);
    assert!(client.closed_within(IO_TIMEOUT).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let server = TestServer::start_with(tree(), |config| {
        config.performance.keep_alive_timeout = 1;
    })
    .await;
    let mut client = server.connect().await;

    assert_eq!(client.get("/a.txt").await.status, 200);
    assert!(client.closed_within(IO_TIMEOUT).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_incomplete_head_times_out() {
    let server = TestServer::start_with(tree(), |config| {
        config.performance.header_read_timeout = 1;
    })
    .await;
    let mut client = server.connect().await;

    client.send_raw("GET /a.txt HTTP/1.1\r\nHost: local").await;
    assert!(client.closed_within(IO_TIMEOUT).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_max_connections() {
    let server = TestServer::start_with(tree(), |config| {
        config.performance.max_connections = Some(1);
    })
    .await;

    let mut first = server.connect().await;
    assert_eq!(first.get("/a.txt").await.status, 200);

    let mut second = server.connect().await;
    assert!(second.closed_within(IO_TIMEOUT).await);

    // The first connection is unaffected
    assert_eq!(first.get("/a.txt").await.status, 200);

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = TestServer::start(tree()).await;
    let addr = server.addr;
    let mut idle = server.connect().await;
    assert_eq!(idle.get("/a.txt").await.status, 200);

    server.shutdown().await;

    // Idle keep-alive connections are closed, and the port no longer accepts
    assert!(idle.closed_within(IO_TIMEOUT).await);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_bind_in_use_fails() {
    let server = TestServer::start(tree()).await;
    let err = server::create_listener(server.addr).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);
    server.shutdown().await;
}
