//! PiBox framebuffer daemon
//!
//! Drives the small status panel: paints a splash at boot, shows system
//! stats while idle and renders colours, images, GIFs, text and QR codes
//! on request over a local control socket.

mod app;
mod config;
mod error;
mod platform;
mod render;
mod server;
mod status;
mod ui;

use anyhow::{Context, Result};
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use app::AppContext;
use config::Config;
use platform::displays::DisplayScanner;
use platform::metrics::SystemSampler;
use platform::Backlight;
use status::StatusTask;
use ui::text::FontSet;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    info!("PiBox framebuffer starting...");

    match run().await {
        Ok(()) => {
            info!("PiBox framebuffer exiting cleanly");
            process::exit(0);
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("\nFATAL ERROR: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    if let Err(e) = Backlight::new(&config.sys_root, config.backlight_pin).on() {
        warn!("Could not enable backlight: {:#}", e);
    }

    let device = DisplayScanner::new(&config.sys_root, config.display_driver.clone())
        .find_display()
        .context("Failed to locate display")?;

    let fonts = FontSet::load(&config.font_regular, &config.font_bold)
        .context("Failed to load fonts")?;

    let ctx = AppContext::new(ui::create_sink(&device), Arc::new(fonts));

    show_splash(&ctx, &config).await;

    let status = StatusTask::new(
        ctx.clone(),
        SystemSampler::new(&config.temp_probe),
        config.status_initial_delay,
        config.status_interval,
    );
    let status = tokio::spawn(status.run());

    tokio::spawn(watch_signals(ctx.shutdown.clone()));

    let result = match server::bind(&config.socket_path) {
        Ok(listener) => server::serve(listener, ctx.clone(), config.max_body_bytes).await,
        Err(e) => Err(e),
    };

    ctx.shutdown.cancel();
    if let Err(e) = status.await {
        warn!("Status task ended abnormally: {e}");
    }
    result
}

async fn show_splash(ctx: &AppContext, config: &Config) {
    let background = if config.splash_image.exists() {
        match image::open(&config.splash_image) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!("Could not load splash {}: {e}", config.splash_image.display());
                None
            }
        }
    } else {
        None
    };

    if let Err(e) = ctx.renderer.splash(background).await {
        warn!("Splash failed: {e}");
    }
}

/// Cancel on Ctrl-C or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => Some(term),
        Err(e) => {
            warn!("Could not install SIGTERM handler, watching Ctrl-C only: {e}");
            None
        }
    };
    let terminated = async {
        match term.as_mut() {
            Some(term) => {
                term.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = terminated => info!("Terminated"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}
