use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use jarvis_focus::coordinator::remote_click_forwarder;
use jarvis_focus::gaze::parse_input_line;
use jarvis_focus::voice::{
    AudioSink, ClockSink, CpalSink, PlaybackWorker, TtsPipeline, Utterance,
    envelope, read_wav, write_wav,
};
use jarvis_focus::{
    BridgeServer, BroadcastBridge, Config, Coordinator, CoordinatorSettings, FrameInput,
    PoseThresholds,
};

/// Frames queued from the detector before input is applied
const INPUT_QUEUE: usize = 256;

/// Jarvis - roasts you when you look away from the screen
#[derive(Parser)]
#[command(name = "jarvis", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/jarvis/config.toml)
    #[arg(short, long, env = "JARVIS_CONFIG")]
    config: Option<PathBuf>,

    /// Push-channel port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Keep time without touching the audio device
    #[arg(long, env = "JARVIS_MUTE")]
    mute: bool,

    /// Do not start the push channel
    #[arg(long)]
    no_bridge: bool,

    /// Print one JSON view per frame on stdout
    #[arg(long)]
    frames: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Track attention from detector lines on stdin (default)
    Run,
    /// Play a test tone
    TestSpeaker,
    /// Synthesize a line and report its envelope
    TestTts {
        /// Text to speak
        #[arg(default_value = "You're not Iron-Man lil bro")]
        text: String,
        /// Write the audio to this WAV file instead of playing it
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the loudness envelope of a WAV file
    Envelope {
        /// WAV file to analyse
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,jarvis_focus=info",
        1 => "info,jarvis_focus=debug",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so stdout stays free for frame views
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::TestSpeaker) => test_speaker(cli.mute).await,
        Some(Command::TestTts { ref text, ref out }) => {
            test_tts(&cli, text, out.as_deref()).await
        }
        Some(Command::Envelope { ref file }) => print_envelope(file),
        Some(Command::Run) | None => run_loop(&cli).await,
    }
}

fn output_sink(mute: bool) -> Arc<dyn AudioSink> {
    if mute {
        Arc::new(ClockSink::new())
    } else {
        Arc::new(CpalSink::new())
    }
}

/// Main frame loop: stdin detector lines in, speech and broadcasts out
async fn run_loop(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    tracing::info!(
        away_hold_s = config.thresholds.away_hold_s,
        cooldown_s = config.thresholds.cooldown_s,
        window = config.thresholds.smoothing_window,
        mute = cli.mute,
        "starting jarvis"
    );

    let voice = match config.tts.build_synthesizer() {
        Ok(synth) => Some(TtsPipeline::new(synth, output_sink(cli.mute))),
        Err(e) => {
            tracing::warn!("speech disabled: {e}");
            None
        }
    };

    let (input_tx, input_rx) = mpsc::channel::<FrameInput>(INPUT_QUEUE);

    let mut server = None;
    let bridge = if config.bridge.enabled && !cli.no_bridge {
        let bridge = BroadcastBridge::spawn();
        bridge.set_click_handler(remote_click_forwarder(input_tx.clone()));

        let port = cli.port.unwrap_or(config.bridge.port);
        let bridge_server = BridgeServer::new(bridge.clone(), config.bridge.host.clone(), port);
        server = Some(bridge_server.spawn());
        Some(bridge)
    } else {
        tracing::info!("push channel disabled");
        None
    };

    let settings = CoordinatorSettings {
        lines: config.lines.clone(),
        click_line: config.click_line.clone(),
        speaking_rate: config.tts.speaking_rate,
    };
    let (coordinator, inbox) = Coordinator::new(
        config.thresholds.focus_machine(),
        settings,
        voice,
        bridge,
    )?;

    tokio::spawn(read_stdin(input_tx, config.thresholds.pose()));

    let print_frames = cli.frames;
    coordinator
        .run(
            input_rx,
            inbox,
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
            |view| {
                if print_frames {
                    if let Ok(line) = serde_json::to_string(view) {
                        println!("{line}");
                    }
                }
            },
        )
        .await;

    if let Some(server) = server {
        server.abort();
    }

    Ok(())
}

/// Forward detector lines into the frame loop; end of input quits
async fn read_stdin(inputs: mpsc::Sender<FrameInput>, pose: PoseThresholds) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_input_line(&line, &pose) {
                Ok(Some(input)) => {
                    if inputs.send(input).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "skipping input line"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stdin");
                break;
            }
        }
    }

    tracing::debug!("stdin closed");
    let _ = inputs.send(FrameInput::Quit).await;
}

/// Test speaker output
async fn test_speaker(mute: bool) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 1 second\n");

    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut worker = PlaybackWorker::new(output_sink(mute));
    worker.set_on_finished(Arc::new(move |id| {
        let _ = done_tx.send(id);
    }));

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    worker.play(samples.into(), sample_rate)?;

    if tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
        .await
        .is_err()
    {
        anyhow::bail!("playback did not finish");
    }

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Synthesize `text`, print envelope stats, then play or save it
async fn test_tts(cli: &Cli, text: &str, out: Option<&Path>) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(cli.config.as_deref())?;
    let synth = config.tts.build_synthesizer()?;

    println!("Synthesizing speech...");
    let pcm = synth.synthesize(text, config.tts.speaking_rate).await?;
    let utterance = Utterance::from_pcm(text, pcm);
    print_utterance_stats(&utterance);

    if let Some(path) = out {
        write_wav(path, &utterance.samples, utterance.sample_rate)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let (mut pipeline, mut ended) = TtsPipeline::new(synth, output_sink(cli.mute));
    let clip_len = utterance.duration;
    pipeline.start(utterance)?;
    println!("Playing...");

    if tokio::time::timeout(clip_len + Duration::from_secs(3), ended.recv())
        .await
        .is_err()
    {
        anyhow::bail!("playback did not finish");
    }

    println!("Done");
    Ok(())
}

/// Print the envelope of a WAV file
fn print_envelope(file: &Path) -> anyhow::Result<()> {
    let pcm = read_wav(file)?;
    let utterance = Utterance::from_pcm(file.display().to_string(), pcm);
    print_utterance_stats(&utterance);

    let values: Vec<String> = utterance
        .envelope
        .iter()
        .map(|v| format!("{v:.2}"))
        .collect();
    println!("{}", values.join(" "));

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn print_utterance_stats(utterance: &Utterance) {
    let env = &utterance.envelope;
    let mean = if env.is_empty() {
        0.0
    } else {
        env.iter().sum::<f32>() / env.len() as f32
    };

    println!("Samples:    {} at {} Hz", utterance.samples.len(), utterance.sample_rate);
    println!("Duration:   {:.2}s", utterance.duration.as_secs_f64());
    println!(
        "Envelope:   {} points ({} ms frames), mean {mean:.2}",
        env.len(),
        envelope::FRAME_MS
    );
}
