use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use annotation::{HeadlessSurface, ROTATE_CONTROL, SAVE_CONTROL, Status};
use clap::Parser;
use client::{ClientConfig, HttpStreetViewService};
use foundation::Coordinate;
use runtime::{Session, SessionConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless street-view annotation driver")]
struct Args {
    /// Point to annotate as `lat,lng`
    #[arg(long, allow_hyphen_values = true)]
    at: String,

    /// Number of 90° rotations after the first image loads
    #[arg(long, default_value_t = 0)]
    rotate: u32,

    /// Save the final image through the backend
    #[arg(long)]
    save: bool,

    /// Write the final image to this file
    #[arg(long)]
    out: Option<PathBuf>,

    /// Image endpoint (default: $STREETVIEW_URL or the local backend)
    #[arg(long)]
    street_view_url: Option<String>,

    /// Persistence endpoint (default: $SAVE_LOCATION_URL or the local backend)
    #[arg(long)]
    save_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let at = parse_coordinate(&args.at)?;

    let mut config = ClientConfig::from_env();
    if let Some(url) = args.street_view_url {
        config.street_view_url = url;
    }
    if let Some(url) = args.save_url {
        config.save_location_url = url;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }

    let service = Arc::new(HttpStreetViewService::new(config.clone())?);
    let session_config = SessionConfig {
        fetch_timeout: config.timeout,
        ..SessionConfig::default()
    };
    let mut session = Session::new(service.clone(), session_config).with_store(service);
    let mut surface = HeadlessSurface::new();
    session.start(&mut surface);

    surface.click(at);
    session.run_until_idle(&mut surface).await;
    report(&session);

    for _ in 0..args.rotate {
        if !press(&session, &mut surface, ROTATE_CONTROL.element_id) {
            break;
        }
        session.run_until_idle(&mut surface).await;
        report(&session);
    }

    if args.save && press(&session, &mut surface, SAVE_CONTROL.element_id) {
        session.run_until_idle(&mut surface).await;
    }

    for op in surface.drain_journal() {
        info!("surface: {op:?}");
    }
    for event in session.drain_events() {
        info!("event {}: {} {}", event.seq, event.kind, event.message);
    }

    if let Some(out) = args.out {
        match session.controller().view().and_then(|v| v.image()) {
            Some(image) => {
                tokio::fs::write(&out, image).await?;
                println!("wrote {} bytes to {}", image.len(), out.display());
            }
            None => warn!("no image loaded, {} not written", out.display()),
        }
    }

    Ok(())
}

fn press(session: &Session, surface: &mut HeadlessSurface, element_id: &str) -> bool {
    let Some(view) = session.controller().view() else {
        return false;
    };
    let pressed = surface.activate(view.marker, element_id);
    if !pressed {
        warn!("{element_id} is not available in the current popup");
    }
    pressed
}

fn report(session: &Session) {
    let Some(view) = session.controller().view() else {
        return;
    };
    let status = match &view.status {
        Status::Loading => "loading".to_string(),
        Status::Loaded(image) => format!("loaded {} bytes", image.len()),
        Status::Failed(message) => format!("failed: {message}"),
    };
    println!("{}\theading {}\t{status}", view.coordinate, view.heading);
}

fn parse_coordinate(raw: &str) -> Result<Coordinate, Box<dyn std::error::Error>> {
    let Some((lat, lng)) = raw.split_once(',') else {
        return Err("coordinate must be lat,lng".into());
    };
    let at = Coordinate::new(lat.trim().parse()?, lng.trim().parse()?);
    if !at.is_valid() {
        return Err(format!("coordinate out of range: {raw}").into());
    }
    Ok(at)
}
