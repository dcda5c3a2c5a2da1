use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gemwire::client::RedirectedRequest;
use gemwire::transport::{BoxStream, Dialer};
use gemwire::{BoxFuture, Client, Context, Error, StatusCode};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use url::Url;

type Reply = fn(&str) -> String;

/// Dialer answering each request line from an in-memory script.
#[derive(Clone)]
struct ScriptedDialer {
    reply: Reply,
    dials: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    addrs: Arc<Mutex<Vec<String>>>,
}

impl ScriptedDialer {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            dials: Arc::default(),
            requests: Arc::default(),
            addrs: Arc::default(),
        }
    }

    fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Dialer for ScriptedDialer {
    fn dial<'a>(
        &'a self,
        _ctx: &'a Context,
        addr: &'a str,
        _domain: &'a str,
    ) -> BoxFuture<'a, io::Result<BoxStream>> {
        Box::pin(async move {
            self.dials.fetch_add(1, Ordering::SeqCst);
            self.addrs.lock().unwrap().push(addr.to_string());

            let (client, server) = tokio::io::duplex(64 * 1024);
            let reply = self.reply;
            let requests = self.requests.clone();
            tokio::spawn(async move {
                let mut server = BufReader::new(server);
                let mut line = String::new();
                if server.read_line(&mut line).await.is_err() {
                    return;
                }
                let request = line.trim_end().to_string();
                requests.lock().unwrap().push(request.clone());

                let server = server.get_mut();
                let _ = server.write_all(reply(&request).as_bytes()).await;
                let _ = server.shutdown().await;
            });

            Ok(Box::new(client) as BoxStream)
        })
    }
}

/// Dialer that never gets a reply.
struct SilentDialer;

impl Dialer for SilentDialer {
    fn dial<'a>(
        &'a self,
        _ctx: &'a Context,
        _addr: &'a str,
        _domain: &'a str,
    ) -> BoxFuture<'a, io::Result<BoxStream>> {
        Box::pin(async move {
            let (client, server) = tokio::io::duplex(1024);
            tokio::spawn(async move {
                let _server = server;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
            Ok(Box::new(client) as BoxStream)
        })
    }
}

struct RefusingDialer;

impl Dialer for RefusingDialer {
    fn dial<'a>(
        &'a self,
        _ctx: &'a Context,
        _addr: &'a str,
        _domain: &'a str,
    ) -> BoxFuture<'a, io::Result<BoxStream>> {
        Box::pin(async move {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        })
    }
}

fn client(dialer: impl Dialer + 'static) -> Client {
    Client::builder().dialer(dialer).build().unwrap()
}

#[tokio::test]
async fn test_fetch_success() {
    let dialer = ScriptedDialer::new(|_| "20 text/gemini\r\nhello".to_string());
    let client = client(dialer.clone());

    let mut resp = client
        .fetch(&Context::background(), "gemini://example.com/page")
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::Success);
    assert_eq!(resp.meta(), "text/gemini");
    assert_eq!(resp.text().await.unwrap(), "hello");
    let _ = resp.close().await;

    assert_eq!(dialer.requests(), vec!["gemini://example.com/page"]);
    assert_eq!(*dialer.addrs.lock().unwrap(), vec!["example.com:1965"]);
}

#[tokio::test]
async fn test_fetch_uses_explicit_port() {
    let dialer = ScriptedDialer::new(|_| "20 text/gemini\r\n".to_string());
    let client = client(dialer.clone());

    let mut resp = client
        .fetch(&Context::background(), "gemini://example.com:1966/")
        .await
        .unwrap();
    let _ = resp.close().await;

    assert_eq!(*dialer.addrs.lock().unwrap(), vec!["example.com:1966"]);
}

#[tokio::test]
async fn test_non_redirect_failures_are_returned_as_responses() {
    let dialer = ScriptedDialer::new(|_| "51 not here\r\n".to_string());
    let client = client(dialer);

    let mut resp = client
        .fetch(&Context::background(), "gemini://example.com/missing")
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NotFound);
    assert_eq!(resp.meta(), "not here");
    assert!(resp.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_follows_relative_and_absolute_redirects() {
    let dialer = ScriptedDialer::new(|request| match request {
        "gemini://example.com/start" => "30 next\r\n".to_string(),
        "gemini://example.com/next" => "31 gemini://example.org/final\r\n".to_string(),
        _ => "20 text/gemini\r\ndone".to_string(),
    });
    let client = client(dialer.clone());

    let mut resp = client
        .fetch(&Context::background(), "gemini://example.com/start")
        .await
        .unwrap();

    assert_eq!(resp.text().await.unwrap(), "done");
    assert_eq!(
        dialer.requests(),
        vec![
            "gemini://example.com/start",
            "gemini://example.com/next",
            "gemini://example.org/final",
        ]
    );
}

#[tokio::test]
async fn test_redirect_loop_stops_after_ten_dials() {
    let dialer = ScriptedDialer::new(|_| "30 gemini://example.com/loop\r\n".to_string());
    let client = client(dialer.clone());

    let err = client
        .fetch(&Context::background(), "gemini://example.com/loop")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TooManyRedirects));
    assert_eq!(dialer.dials(), 10);
}

#[tokio::test]
async fn test_zero_budget_refuses_first_request() {
    let dialer = ScriptedDialer::new(|_| "30 /elsewhere\r\n".to_string());
    let client = Client::builder()
        .dialer(dialer.clone())
        .max_redirects(0)
        .build()
        .unwrap();

    let err = client
        .fetch(&Context::background(), "gemini://example.com/")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TooManyRedirects));
    assert_eq!(dialer.dials(), 0);
}

#[tokio::test]
async fn test_custom_redirect_policy() {
    let dialer = ScriptedDialer::new(|_| "30 gemini://elsewhere.org/\r\n".to_string());
    let client = Client::builder()
        .dialer(dialer.clone())
        .redirect_policy(
            |_ctx: &Context, next: &Url, _via: &[RedirectedRequest]| -> gemwire::Result<()> {
                match next.host_str() {
                    Some("example.com") => Ok(()),
                    other => Err(Error::Redirect(format!("off-site redirect to {other:?}"))),
                }
            },
        )
        .build()
        .unwrap();

    let err = client
        .fetch(&Context::background(), "gemini://example.com/")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Redirect(_)));
    assert_eq!(dialer.dials(), 1);
}

#[tokio::test]
async fn test_invalid_header_is_reported() {
    let dialer = ScriptedDialer::new(|_| "99 what\r\n".to_string());
    let client = client(dialer);

    let err = client
        .fetch(&Context::background(), "gemini://example.com/")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_oversized_header_is_reported() {
    let dialer = ScriptedDialer::new(|_| format!("20 {}\r\n", "m".repeat(2000)));
    let client = client(dialer);

    let err = client
        .fetch(&Context::background(), "gemini://example.com/")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HeaderTooLarge));
}

#[tokio::test]
async fn test_dial_failure_names_host() {
    let client = client(RefusingDialer);

    let err = client
        .fetch(&Context::background(), "gemini://example.com/")
        .await
        .unwrap_err();

    match err {
        Error::Dial { host, source } => {
            assert_eq!(host, "example.com:1965");
            assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_url_errors() {
    let client = client(RefusingDialer);
    let ctx = Context::background();

    assert!(matches!(
        client.fetch(&ctx, "not a url").await,
        Err(Error::Url(_))
    ));
    assert!(matches!(
        client.fetch(&ctx, "gemini:/no-host").await,
        Err(Error::MissingHost)
    ));
}

#[tokio::test]
async fn test_deadline_bounds_header_read() {
    let client = client(SilentDialer);
    let ctx = Context::background().with_timeout(Duration::from_millis(50));

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        client.fetch(&ctx, "gemini://example.com/"),
    )
    .await
    .expect("fetch must respect the context deadline");

    assert!(result.is_err());
}

#[tokio::test]
async fn test_close_is_not_repeatable() {
    let dialer = ScriptedDialer::new(|_| "20 text/gemini\r\nbody".to_string());
    let client = client(dialer);

    let mut resp = client
        .fetch(&Context::background(), "gemini://example.com/")
        .await
        .unwrap();

    let _ = resp.close().await;
    assert!(resp.is_closed());
    assert!(matches!(resp.close().await, Err(Error::AlreadyClosed)));
}
