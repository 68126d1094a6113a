use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sparkbot_voice::voice::{
    AudioSink, ChatModel, Clips, EnergyEngine, HttpChat, HttpSpeechToText, HttpTextToSpeech,
    METER_INTERVAL, Microphone, Speaker, TextToSpeech, levels, tone,
};
use sparkbot_voice::{Config, Devices, Pipeline, PipelineMode, Services};

/// Sparkbot - wakeword-driven voice assistant
#[derive(Parser)]
#[command(name = "sparkbot", version, about)]
struct Cli {
    /// Routing mode (idle, chat, image)
    #[arg(short, long, env = "SPARKBOT_MODE")]
    mode: Option<PipelineMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Run the voice pipeline until interrupted (default)
    Run,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// One chat round trip, printed and spoken
    Ask {
        /// Question to send
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,sparkbot_voice=info",
        1 => "info,sparkbot_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
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
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_pipeline(cli.mode).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker(),
        Command::TestTts { text } => test_tts(&text).await,
        Command::Ask { text } => ask(&text).await,
    }
}

async fn run_pipeline(mode: Option<PipelineMode>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(mode) = mode {
        config.pipeline.mode = mode;
    }
    tracing::debug!(?config, "loaded configuration");

    let rate = config.audio.sample_rate;

    let services = Services {
        stt: Arc::new(HttpSpeechToText::new(&config.stt, rate)?),
        chat: Arc::new(HttpChat::new(&config.chat)?),
        tts: Arc::new(HttpTextToSpeech::new(&config.tts, rate)?),
    };

    let clips = Clips::load(&config.clips, rate)?;
    let microphone = Microphone::open(rate, config.audio.mic_gain)?;
    let closer = microphone.closer();
    let devices = Devices {
        source: Box::new(microphone),
        sink: Box::new(Speaker::open(rate)?),
        engine: Arc::new(EnergyEngine::new(&config.detector, rate)),
    };

    let handle = Pipeline::new(config, clips).spawn(devices, services)?;
    tracing::info!(mode = %handle.mode(), "sparkbot ready - say something loud, then speak");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    closer.close();
    handle.join().await;

    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let microphone = Microphone::open(config.audio.sample_rate, config.audio.mic_gain)?;
    println!("Sample rate: {} Hz", microphone.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(METER_INTERVAL).await;

        let (rms, peak) = levels(&microphone.take_buffer());

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {rms:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    drop(microphone);

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Raise [audio] mic_gain in the config file");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    let config = Config::load()?;
    let rate = config.audio.sample_rate;

    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut speaker = Speaker::open(rate)?;
    let pcm = tone(rate, &[(440.0, Duration::from_secs(2))]);
    speaker.write(&pcm)?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Test TTS output
async fn test_tts(text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Testing TTS with text: \"{text}\"\n");

    let tts = HttpTextToSpeech::new(&config.tts, config.audio.sample_rate)?;
    let mut speaker = Speaker::open(config.audio.sample_rate)?;
    let bytes = speak(&tts, &mut speaker, text).await?;

    println!("Played {bytes} bytes of audio");
    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// One chat round trip
async fn ask(text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;

    let chat = HttpChat::new(&config.chat)?;
    let reply = chat.complete(text).await?;
    println!("{reply}");

    let tts = HttpTextToSpeech::new(&config.tts, config.audio.sample_rate)?;
    let mut speaker = Speaker::open(config.audio.sample_rate)?;
    speak(&tts, &mut speaker, &reply).await?;

    Ok(())
}

/// Synthesize `text` and play it chunk by chunk
async fn speak(tts: &dyn TextToSpeech, speaker: &mut Speaker, text: &str) -> anyhow::Result<usize> {
    let mut stream = tts.synthesize(text).await?;
    let mut total = 0;
    while let Some(chunk) = stream.recv().await? {
        total += tokio::task::block_in_place(|| speaker.write(&chunk))?;
    }
    Ok(total)
}
