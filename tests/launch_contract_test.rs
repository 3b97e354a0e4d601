use anyhow::Result;
use axum::routing::get;
use axum::Router;
use demo_service::domain::ports::Application;
use demo_service::{AppRegistry, DemoApp, DemoSettings, LaunchConfig, Launcher, ServiceError};
use std::net::TcpListener as StdListener;
use std::sync::Arc;
use tokio::sync::oneshot;

struct FixedResponse;

impl Application for FixedResponse {
    fn router(&self) -> Router {
        Router::new().route("/", get(|| async { "fixed" }))
    }
}

fn free_port() -> u16 {
    let listener = StdListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn registry() -> AppRegistry {
    AppRegistry::new().register("main", "app", || {
        Ok(Arc::new(FixedResponse) as Arc<dyn Application>)
    })
}

fn port_is_free(port: u16) -> bool {
    StdListener::bind(("127.0.0.1", port)).is_ok()
}

/// 無法解析的應用程式不應佔用連接埠
#[tokio::test]
async fn test_unresolvable_app_never_binds() -> Result<()> {
    for reference in ["main:missing", "nowhere:app", "main", ":app"] {
        let port = free_port();
        let launcher = Launcher::new(LaunchConfig::new(reference, "127.0.0.1", port), registry());

        let err = launcher.bind().await.err().unwrap();
        assert!(
            matches!(err, ServiceError::ResolutionError { .. }),
            "{} gave {:?}",
            reference,
            err
        );
        assert_eq!(err.exit_code(), 3);
        assert!(port_is_free(port), "{} left port {} bound", reference, port);
    }
    Ok(())
}

#[tokio::test]
async fn test_failing_loader_is_a_resolution_error() -> Result<()> {
    let registry = AppRegistry::new().register("main", "app", || {
        Err(ServiceError::config("settings file unreadable"))
    });
    let port = free_port();
    let launcher = Launcher::new(LaunchConfig::new("main:app", "127.0.0.1", port), registry);

    let err = launcher.bind().await.err().unwrap();
    assert!(matches!(err, ServiceError::ResolutionError { .. }));
    assert!(port_is_free(port));
    Ok(())
}

/// 連接埠被佔用時不可改用其他連接埠
#[tokio::test]
async fn test_occupied_port_fails_without_fallback() -> Result<()> {
    let holder = StdListener::bind("127.0.0.1:0")?;
    let port = holder.local_addr()?.port();

    let launcher = Launcher::new(LaunchConfig::new("main:app", "127.0.0.1", port), registry());
    let err = launcher.bind().await.err().unwrap();

    match &err {
        ServiceError::BindError { addr, .. } => assert_eq!(addr.port(), port),
        other => panic!("expected bind error, got {:?}", other),
    }
    assert_ne!(err.exit_code(), 0);
    Ok(())
}

#[tokio::test]
async fn test_port_zero_is_rejected() -> Result<()> {
    let launcher = Launcher::new(LaunchConfig::new("main:app", "127.0.0.1", 0), registry());
    let err = launcher.bind().await.err().unwrap();
    assert!(matches!(err, ServiceError::InvalidConfigValueError { .. }));
    Ok(())
}

#[tokio::test]
async fn test_serves_on_configured_port_until_shutdown() -> Result<()> {
    let port = free_port();
    let launcher = Launcher::new(LaunchConfig::new("main:app", "127.0.0.1", port), registry());
    let server = launcher.bind().await?;
    assert_eq!(server.local_addr().port(), port);
    assert_eq!(server.app_ref().to_string(), "main:app");

    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve_until(async move {
        let _ = stopped.await;
    }));

    let body = reqwest::get(format!("http://127.0.0.1:{}/", port))
        .await?
        .text()
        .await?;
    assert_eq!(body, "fixed");

    let _ = stop.send(());
    handle.await??;
    assert!(port_is_free(port));
    Ok(())
}

#[tokio::test]
async fn test_demo_app_end_to_end() -> Result<()> {
    let app = DemoApp::new(DemoSettings {
        slow_min_secs: 0.0,
        slow_max_secs: 0.01,
    });
    let metrics = app.metrics();
    let registry = AppRegistry::new().register("main", "app", move || {
        Ok(Arc::new(app.clone()) as Arc<dyn Application>)
    });

    let port = free_port();
    let server = Launcher::new(LaunchConfig::new("main:app", "127.0.0.1", port), registry)
        .bind()
        .await?;
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve_until(async move {
        let _ = stopped.await;
    }));

    let base = format!("http://127.0.0.1:{}", port);
    let health = reqwest::get(format!("{}/health", base)).await?;
    assert_eq!(health.status().as_u16(), 200);
    assert!(health.headers().contains_key("x-process-time"));
    let json: serde_json::Value = health.json().await?;
    assert_eq!(json["status"], "healthy");

    let slow = reqwest::get(format!("{}/slow", base)).await?;
    assert_eq!(slow.status().as_u16(), 200);

    let user = reqwest::get(format!("{}/users/abc", base)).await?;
    assert_eq!(user.status().as_u16(), 422);

    let exposition = reqwest::get(format!("{}/metrics", base)).await?.text().await?;
    assert!(exposition.contains("http_requests_total"));
    assert!(metrics.observed_requests() >= 3);

    let _ = stop.send(());
    handle.await??;
    Ok(())
}
