use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::time::sleep;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use visca_serial::{
    open_port, spawn_link, CameraLink, Direction, LinkConfig, LinkHandle, Position, SerialProfile,
    ViscaResult, ZoomDirection,
};

/// Control a VISCA pan-tilt-zoom camera on a serial port.
#[derive(Debug, Parser)]
#[command(name = "viscactl")]
struct Args {
    /// Serial port the camera is attached to.
    #[arg(short, long, env = "VISCA_PORT")]
    port: String,

    /// Camera address on the VISCA bus.
    #[arg(short, long, default_value_t = 1)]
    camera: u8,

    /// Line speed of the serial port.
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// How long to wait for each reply.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Pan and tilt speed (1-15) for steering and absolute moves.
    #[arg(short, long)]
    speed: Option<u8>,

    /// Log every frame sent and received.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start moving; with --hold-ms, stop again after that long.
    Steer {
        direction: Direction,
        #[arg(long)]
        hold_ms: Option<u64>,
    },
    /// Stop pan/tilt movement.
    Stop,
    /// Home the pan/tilt motors.
    Center,
    /// Start zooming; with --hold-ms, stop again after that long.
    Zoom {
        direction: ZoomDirection,
        #[arg(long)]
        hold_ms: Option<u64>,
    },
    /// Stop zooming.
    StopZoom,
    /// Print pan, tilt and zoom.
    Position,
    /// Move to an absolute pan, tilt and zoom.
    Goto { pan: u16, tilt: u16, zoom: u16 },
    /// Print the focus position, or move to one.
    Focus { value: Option<u16> },
    /// Turn autofocus on or off, toggle it, or print its state.
    Autofocus { mode: AutofocusMode },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AutofocusMode {
    On,
    Off,
    Toggle,
    Status,
}

async fn run(link: &LinkHandle, command: Command) -> ViscaResult<()> {
    match command {
        Command::Steer { direction, hold_ms } => {
            link.steer(direction).await?;
            if let Some(ms) = hold_ms {
                sleep(Duration::from_millis(ms)).await;
                link.stop_steer().await?;
            }
        }
        Command::Stop => link.stop_steer().await?,
        Command::Center => link.center().await?,
        Command::Zoom { direction, hold_ms } => {
            link.zoom(direction).await?;
            if let Some(ms) = hold_ms {
                sleep(Duration::from_millis(ms)).await;
                link.stop_zoom().await?;
            }
        }
        Command::StopZoom => link.stop_zoom().await?,
        Command::Position => {
            let Position { pan, tilt, zoom } = link.get_position().await?;
            println!("pan {pan} tilt {tilt} zoom {zoom}");
        }
        Command::Goto { pan, tilt, zoom } => link.go_to_position(Position { pan, tilt, zoom }).await?,
        Command::Focus { value: Some(v) } => link.go_to_focus(v).await?,
        Command::Focus { value: None } => println!("focus {}", link.get_focus().await?),
        Command::Autofocus { mode } => match mode {
            AutofocusMode::On => link.set_autofocus(true).await?,
            AutofocusMode::Off => link.set_autofocus(false).await?,
            AutofocusMode::Toggle => link.toggle_autofocus().await?,
            AutofocusMode::Status => {
                let on = link.get_autofocus().await?;
                println!("autofocus {}", if on { "on" } else { "off" });
            }
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ViscaResult<()> {
    let opts = Args::parse();
    let default_level = if opts.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .compact()
        .init();

    let profile = SerialProfile {
        baud: opts.baud,
        ..SerialProfile::default()
    };
    let config = LinkConfig {
        camera: opts.camera,
        reply_timeout: Duration::from_millis(opts.timeout_ms),
        ..LinkConfig::default()
    };
    let port = open_port(&opts.port, &profile)?;
    let link = spawn_link(CameraLink::connect(port, config)?);
    info!("connected to {link} on {}", opts.port);

    if let Some(speed) = opts.speed {
        link.set_speed(speed).await?;
    }
    let r = run(&link, opts.command).await;
    link.close().await?;
    r
}
