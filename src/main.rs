use anyhow::Context as _;
use gemwire::config::Config;
use gemwire::{Context, Router, Server, handlers, tls};

const WELCOME: &str = "# gemwire\r\n\r\nNo pages configured.\r\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let tls = tls::server_config_from_pem(&cfg.tls.cert_path, &cfg.tls.key_path)
        .context("loading TLS certificate")?;

    let mut router = Router::new();
    for (pattern, file) in &cfg.pages {
        let content =
            std::fs::read(file).with_context(|| format!("reading page {}", file.display()))?;
        let content_type = handlers::content_type(file, &content);
        router = router.handle(pattern, handlers::serve_content(content_type, content));
    }
    if router.is_empty() {
        router = router.handle("/", handlers::serve_content("text/gemini", WELCOME));
    }

    let timeout = cfg.connection_timeout();
    let server = Server::builder(router)
        .addr(cfg.server.listen_addr.clone())
        .hosts(cfg.server.hosts.clone())
        .max_connections(cfg.server.max_connections)
        .conn_context(move |ctx, _info| match timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        })
        .build();

    let (ctx, canceller) = Context::background().with_cancel();
    let serve = server.listen_and_serve(ctx, tls);
    tokio::pin!(serve);

    let result = tokio::select! {
        res = &mut serve => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            canceller.cancel();
            serve.await
        }
    };

    match result {
        Ok(()) | Err(gemwire::Error::ServerClosed) => Ok(()),
        Err(e) => Err(e).context("serving"),
    }
}
