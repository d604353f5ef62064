mod audio_input;
mod config;
mod corpus;
mod dataset;
mod download;
mod export;
mod segmentation;
mod transcribe;
mod transcript;
mod tts;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use audio_input::read_wav;
use config::Settings;
use segmentation::{normalize_spans, scan_speech};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file; defaults apply when it does not exist
    #[arg(short, long, global = true, default_value = "corpus-kit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default settings to the config path
    InitConfig,

    /// Download YouTube audio as WAV for every URL in a list file
    Download {
        #[arg(short, long, default_value = "input/video.txt")]
        list: PathBuf,
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Down-mix to mono and resample to the training sample rate
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long)]
        sample_rate: Option<u32>,
    },

    /// Cut a recording into speech chunks at silences
    Split {
        input: PathBuf,
        #[arg(short, long, default_value = "split")]
        output: PathBuf,
        /// Chunk file prefix; defaults to the input stem without `_converted`
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Transcribe the chunks of one recording
    Transcribe {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "split")]
        audio_directory: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clean a raw transcript into sorted `audio/<name>_chunk_<n>.wav|text` lines
    Clean {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pair numbered WAVs with transcript lines and report missing numbers
    Assemble {
        #[arg(short, long, default_value = "wavs")]
        audio_directory: PathBuf,
        #[arg(short, long)]
        transcript: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        missing: Option<PathBuf>,
    },

    /// Shuffle `path|text` lists and split them into train and validation files
    SplitDataset {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, default_value = "output/train.txt")]
        train: PathBuf,
        #[arg(long, default_value = "output/val.txt")]
        val: PathBuf,
    },

    /// Text corpus preparation
    #[command(subcommand)]
    Corpus(CorpusStep),

    /// Shuffle a text file and keep lines up to a character budget
    SampleText {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long)]
        max_chars: Option<usize>,
    },

    /// Synthesize every line of a text file through the Vbee API
    Synthesize {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = "vbee")]
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum CorpusStep {
    /// Keep clean Vietnamese lines from every `*.txt` in a directory
    Merge { src: PathBuf, output: PathBuf },
    /// Lowercase and drop repeated lines
    Dedupe { input: PathBuf, output: PathBuf },
    /// Pick random lines and report the vocabulary size
    Select {
        input: PathBuf,
        output: PathBuf,
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

fn default_chunk_name(input: &std::path::Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    stem.strip_suffix("_converted").unwrap_or(&stem).to_string()
}

fn create_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn split(input: PathBuf, output: PathBuf, name: Option<String>, settings: &Settings) -> Result<()> {
    let name = name.unwrap_or_else(|| default_chunk_name(&input));
    let audio = read_wav(&input)?;
    let seg = &settings.segment;

    let spans = scan_speech(&audio, seg);
    let chunks = normalize_spans(&spans, seg.min_length_ms, seg.max_length_ms);
    log::info!(
        "{}: {} ms, {} speech spans, {} chunks",
        input.display(),
        audio.len_ms(),
        spans.len(),
        chunks.len()
    );

    let written = export::export_chunks(&audio, &chunks, &output, &name, &settings.export)?;
    log::info!("{} chunks written to {}", written.len(), output.display());
    Ok(())
}

fn assemble(
    audio_directory: PathBuf,
    transcript_file: PathBuf,
    output: PathBuf,
    missing: Option<PathBuf>,
) -> Result<()> {
    let files = dataset::find_wav_files(&audio_directory)?;
    let gaps = dataset::missing_numbers(&files);
    log::info!("{} wav files, {} missing numbers", files.len(), gaps.len());
    if let Some(missing) = missing {
        dataset::write_numbers(&missing, &gaps)?;
        log::info!("Missing numbers written to {}", missing.display());
    }

    let transcriptions = corpus::read_lines(&transcript_file)?;
    log::info!("Total transcriptions loaded: {}", transcriptions.len());
    let filtered = dataset::filter_transcriptions(&transcriptions, &files);
    transcript::write_entries(&output, &filtered)?;
    log::info!(
        "Filtered transcriptions written to {}, count: {}",
        output.display(),
        filtered.len()
    );
    Ok(())
}

fn split_dataset(inputs: Vec<PathBuf>, train: PathBuf, val: PathBuf, settings: &Settings) -> Result<()> {
    let mut lines = Vec::new();
    for input in &inputs {
        lines.extend(transcript::read_entries(input)?);
    }

    let mut rng = dataset::rng_from_seed(settings.dataset.seed);
    let (train_lines, val_lines) =
        dataset::split_train_val(lines, settings.dataset.train_ratio, &mut rng);
    create_parent_dir(&train)?;
    create_parent_dir(&val)?;
    transcript::write_entries(&train, &train_lines)?;
    transcript::write_entries(&val, &val_lines)?;
    log::info!(
        "Data has been split: {} train, {} validation",
        train_lines.len(),
        val_lines.len()
    );
    Ok(())
}

fn run_corpus(step: CorpusStep, settings: &Settings) -> Result<()> {
    match step {
        CorpusStep::Merge { src, output } => {
            let kept = corpus::merge_text_files(&src, &output, &settings.corpus)?;
            log::info!("Merged {} lines into {}", kept, output.display());
        }
        CorpusStep::Dedupe { input, output } => {
            let lines = corpus::read_lines(&input)?;
            let unique = corpus::lowercase_dedupe(lines.iter().map(String::as_str));
            corpus::write_lines(&output, &unique)?;
            log::info!("{} of {} lines kept in {}", unique.len(), lines.len(), output.display());
        }
        CorpusStep::Select {
            input,
            output,
            count,
        } => {
            let count = count.unwrap_or(settings.corpus.select_lines);
            let mut rng = dataset::rng_from_seed(settings.corpus.seed);
            let selected = corpus::select_random_lines(corpus::read_lines(&input)?, count, &mut rng);
            corpus::write_lines(&output, &selected)?;
            log::info!("Selected {} lines and saved to {}", selected.len(), output.display());
            log::info!(
                "Total number of unique words: {}",
                corpus::count_unique_words(&selected)
            );
        }
    }
    Ok(())
}

fn synthesize(input: PathBuf, output: PathBuf, settings: &Settings) -> Result<()> {
    let texts = corpus::read_lines(&input)?;
    let client = tts::VbeeClient::from_config(&settings.tts)?;
    let api: Arc<dyn tts::SynthesisApi> = Arc::new(client);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.tts.workers.max(1))
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let report = runtime.block_on(tts::synthesize_batch(api, &texts, &settings.tts, &output))?;

    if report.failed > 0 {
        log::warn!("{} of {} texts failed", report.failed, texts.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config)?;

    match cli.command {
        Command::InitConfig => {
            settings.save_to(&cli.config)?;
            log::info!("settings written to {}", cli.config.display());
        }
        Command::Download { list, output } => {
            let content = std::fs::read_to_string(&list)
                .with_context(|| format!("failed to read {}", list.display()))?;
            let urls = download::parse_url_list(&content);
            let saved = download::download_list(&urls, &output, &settings.download);
            log::info!("{} of {} downloads complete", saved.len(), urls.len());
        }
        Command::Convert {
            input,
            output,
            sample_rate,
        } => {
            let rate = sample_rate.unwrap_or(settings.convert.target_sample_rate);
            audio_input::convert(&input, &output, rate)?;
        }
        Command::Split {
            input,
            output,
            name,
        } => split(input, output, name, &settings)?,
        Command::Transcribe {
            name,
            audio_directory,
            output,
        } => {
            let output = output
                .unwrap_or_else(|| PathBuf::from(format!("transcribe/{}_transcribed.txt", name)));
            let transcriber = transcribe::load_transcriber(&settings.transcribe)?;
            let results = transcribe::transcribe_folder(&audio_directory, &name, transcriber.as_ref())?;
            create_parent_dir(&output)?;
            transcribe::write_raw_transcript(&output, &results)?;
            log::info!("{} transcriptions written to {}", results.len(), output.display());
        }
        Command::Clean { input, output } => {
            let output = output.unwrap_or_else(|| {
                input.with_file_name(format!("{}_processed.txt", default_chunk_name(&input)))
            });
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let entries = transcript::process_raw_transcript(raw.lines());
            transcript::write_entries(&output, &entries)?;
            log::info!("Processed text has been saved to {}", output.display());
        }
        Command::Assemble {
            audio_directory,
            transcript,
            output,
            missing,
        } => assemble(audio_directory, transcript, output, missing)?,
        Command::SplitDataset { inputs, train, val } => split_dataset(inputs, train, val, &settings)?,
        Command::Corpus(step) => run_corpus(step, &settings)?,
        Command::SampleText {
            input,
            output,
            max_chars,
        } => {
            let max_chars = max_chars.unwrap_or(settings.corpus.sample_max_chars);
            let mut rng = dataset::rng_from_seed(settings.corpus.seed);
            let text = corpus::sample_text(&corpus::read_lines(&input)?, max_chars, &mut rng);
            create_parent_dir(&output)?;
            std::fs::write(&output, text)
                .with_context(|| format!("failed to write {}", output.display()))?;
            log::info!("sampled text written to {}", output.display());
        }
        Command::Synthesize { input, output } => synthesize(input, output, &settings)?,
    }

    Ok(())
}
