use clap::Parser;
use rtsp::{Codec, PacketizerConfig, Server, ServerConfig};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rtsp-live",
    about = "Streams an Annex-B H.264/H.265 file over RTSP"
)]
struct Args {
    /// Elementary stream file (.h264/.264 or .h265/.265/.hevc)
    file: PathBuf,

    /// RTSP bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:554")]
    bind: SocketAddr,

    /// Codec, inferred from the file extension when omitted
    #[arg(long)]
    codec: Option<Codec>,

    /// Source frame rate, sets the RTP timestamp step
    #[arg(long, default_value_t = 25)]
    fps: u32,

    /// Bytes read from the file per tick
    #[arg(long, default_value_t = 10240)]
    chunk_size: usize,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 40)]
    interval_ms: u64,

    /// UDP source port for RTP
    #[arg(long, default_value_t = 20001)]
    rtp_port: u16,

    /// UDP source port for RTCP
    #[arg(long, default_value_t = 20002)]
    rtcp_port: u16,

    /// Host advertised in the SDP instead of the request host
    #[arg(long)]
    public_host: Option<String>,

    /// Fixed session id for every client (random per client when omitted)
    #[arg(long)]
    session_id: Option<String>,

    /// Stop at end of file instead of looping
    #[arg(long)]
    no_loop: bool,
}

fn codec_for(args: &Args) -> Option<Codec> {
    args.codec.or_else(|| {
        args.file
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Codec::from_extension)
    })
}

/// Feed `file` into the server one chunk per tick until `quit` is set.
///
/// At end of file the pending NAL unit is flushed and the file rewinds,
/// unless `--no-loop` is set.
fn stream_file(
    server: &Server,
    path: &Path,
    args: &Args,
    quit: &AtomicBool,
) -> io::Result<()> {
    let mut file = File::open(path)?;
    let mut chunk = vec![0u8; args.chunk_size.max(1)];
    let interval = Duration::from_millis(args.interval_ms);

    while !quit.load(Ordering::SeqCst) {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            if let Err(e) = server.push_chunk(None) {
                tracing::warn!(error = %e, "flush failed");
            }
            if args.no_loop {
                tracing::info!("end of file");
                break;
            }
            tracing::debug!("end of file, rewinding");
            file.seek(SeekFrom::Start(0))?;
            thread::sleep(interval);
            continue;
        }

        if let Err(e) = server.push_chunk(Some(&chunk[..n])) {
            tracing::warn!(error = %e, "chunk dropped");
        }
        thread::sleep(interval);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let Some(codec) = codec_for(&args) else {
        eprintln!(
            "Cannot infer codec from {}; pass --codec h264 or --codec h265",
            args.file.display()
        );
        return ExitCode::FAILURE;
    };

    let config = ServerConfig {
        bind_addr: args.bind,
        codec,
        public_host: args.public_host.clone(),
        session_id: args.session_id.clone(),
        rtp_server_port: args.rtp_port,
        rtcp_server_port: args.rtcp_port,
        packetizer: PacketizerConfig {
            frame_rate: args.fps,
            ..PacketizerConfig::default()
        },
        ..ServerConfig::default()
    };

    let mut server = Server::new(config);
    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return ExitCode::FAILURE;
    }

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        thread::spawn(move || {
            let mut input = String::new();
            let _ = io::stdin().read_line(&mut input);
            quit.store(true, Ordering::SeqCst);
        });
    }

    println!(
        "Streaming {} ({}) on rtsp://{}, press Enter to stop",
        args.file.display(),
        codec,
        args.bind
    );

    let result = stream_file(&server, &args.file, &args, &quit);
    server.stop();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Failed to read {}: {}", args.file.display(), e);
            ExitCode::FAILURE
        }
    }
}
