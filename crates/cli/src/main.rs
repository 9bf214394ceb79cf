use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use screen_prompt_core::{
    FileSettingsStore, GenerationMode, ProviderKind, ScreenPrompt, SelectionRect, SettingsStore,
    config::MemorySettingsStore,
    presentation::{ArboardClipboard, Clipboard, PresentationEvent, PresentationTarget},
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use termimad::MadSkin;
use termimad::crossterm::style::Color;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Turn a screen region into an AI image prompt", long_about = None)]
struct Args {
    /// midjourney, stablediffusion, naturallanguage, cinematographer or description
    #[arg(short, long)]
    mode: Option<GenerationMode>,

    /// Use this provider for this run only
    #[arg(short, long)]
    provider: Option<ProviderKind>,

    /// Select which monitor to capture
    #[arg(long, default_value_t = 0)]
    monitor: usize,

    /// Skip the overlay and use this logical-pixel region: X,Y,W,H
    #[arg(long, value_parser = parse_region)]
    region: Option<SelectionRect>,

    /// Device pixel ratio for --region (defaults to the display's scale)
    #[arg(long, requires = "region")]
    dpr: Option<f64>,

    /// Copy the result to clipboard automatically
    #[arg(short, long, default_value_t = false)]
    copy: bool,

    /// List available monitors and exit
    #[arg(long)]
    list_monitors: bool,

    /// Save the default provider and exit
    #[arg(long)]
    set_provider: Option<ProviderKind>,

    /// Save the capture hotkey (e.g. Ctrl+F12) and exit
    #[arg(long)]
    set_hotkey: Option<String>,
}

fn parse_region(raw: &str) -> std::result::Result<SelectionRect, String> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("region values must be numbers: {e}"))?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0.0 && *h > 0.0 => Ok(SelectionRect::new(*x, *y, *w, *h)),
        [_, _, _, _] => Err("region width and height must be positive".into()),
        _ => Err("expected X,Y,W,H".into()),
    }
}

/// Shows generation progress in the terminal.
struct TerminalPresenter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl TerminalPresenter {
    fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
        }
    }

    fn stop_spinner(&self) {
        if let Some(spinner) = self.spinner.lock().take() {
            spinner.finish_and_clear();
        }
    }
}

impl PresentationTarget for TerminalPresenter {
    fn key(&self) -> &str {
        "terminal"
    }

    fn present(&self, event: PresentationEvent) {
        match event {
            PresentationEvent::Loading(display) => {
                self.stop_spinner();
                let spinner = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                    .template("{spinner:.green} {msg}")
                {
                    spinner.set_style(style);
                }
                spinner.set_message(display.prompt);
                spinner.enable_steady_tick(Duration::from_millis(100));
                *self.spinner.lock() = Some(spinner);
            }
            PresentationEvent::Ready(display) => {
                self.stop_spinner();
                println!();
                print_markdown(&display.prompt);
            }
            PresentationEvent::Error { message, .. } => {
                self.stop_spinner();
                eprintln!("{message}");
            }
        }
    }
}

fn print_markdown(text: &str) {
    let mut skin = MadSkin::default();
    skin.bold.set_fg(Color::Yellow);
    skin.italic.set_fg(Color::Magenta);
    skin.code_block.set_bg(Color::Rgb { r: 40, g: 40, b: 40 });

    skin.print_text(text);
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("screen_prompt_core=info,screen_prompt_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles the flags that only edit settings. Returns true if one ran.
fn apply_settings_flags(store: &FileSettingsStore, args: &Args) -> Result<bool> {
    if args.set_provider.is_none() && args.set_hotkey.is_none() {
        return Ok(false);
    }

    let mut settings = store.load().context("Failed to load settings")?;
    if let Some(provider) = args.set_provider {
        settings.api_provider = provider;
        println!("Provider set to {provider}");
    }
    if let Some(hotkey) = &args.set_hotkey {
        settings.set_capture_hotkey(hotkey)?;
        println!("Capture hotkey set to {}", settings.capture_hotkey);
    }
    store.save(&settings).context("Failed to save settings")?;
    println!("Saved to {}", store.path().display());
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    init_logging();
    let args = Args::parse();

    let store = FileSettingsStore::open_default().context("Failed to open settings")?;
    if apply_settings_flags(&store, &args)? {
        return Ok(ExitCode::SUCCESS);
    }

    let settings_store: Arc<dyn SettingsStore> = match args.provider {
        Some(provider) => {
            let mut settings = store.load().context("Failed to load settings")?;
            settings.api_provider = provider;
            debug!(%provider, "Provider overridden for this run");
            Arc::new(MemorySettingsStore::new(settings))
        }
        None => Arc::new(store),
    };
    let app = ScreenPrompt::with_settings(settings_store).context("Failed to initialize")?;

    if args.list_monitors {
        println!("Available monitors:");
        for info in app.list_monitors().context("Failed to list monitors")? {
            println!("{}", info);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let settings = app.settings()?;
    if !settings.has_credentials() {
        warn!(provider = %settings.api_provider, "Active provider is not configured");
    }

    let presenter = TerminalPresenter::new();

    let display = app
        .display(args.monitor)
        .context("Failed to find monitor. Try using --list-monitors to check indices")?;
    let frame = match app.capture_frame(&display) {
        Ok(frame) => frame,
        Err(e) => {
            app.report_capture_error(&e, &presenter);
            return Ok(ExitCode::FAILURE);
        }
    };

    let (selection, dpr, mode) = match args.region {
        Some(region) => (region, args.dpr.unwrap_or(display.scale_factor), args.mode),
        None => match app.select_region(&frame, args.mode)? {
            Some(picked) => (picked.selection, picked.device_pixel_ratio, Some(picked.mode)),
            None => {
                println!("Selection cancelled");
                return Ok(ExitCode::SUCCESS);
            }
        },
    };

    if let Err(e) = app.capture_region(&frame, selection, dpr) {
        app.report_capture_error(&e, &presenter);
        return Ok(ExitCode::FAILURE);
    }

    let result = app.generate(mode, &presenter).await;
    let Some(text) = result.text() else {
        return Ok(ExitCode::FAILURE);
    };

    if args.copy {
        match ArboardClipboard::new().and_then(|mut clipboard| clipboard.set_text(text)) {
            Ok(()) => println!("(Copied to clipboard)"),
            Err(e) => warn!(error = %e, "Could not copy to clipboard"),
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_parses_four_numbers() {
        assert_eq!(
            parse_region("100, 50,200,150").unwrap(),
            SelectionRect::new(100.0, 50.0, 200.0, 150.0)
        );
    }

    #[test]
    fn region_rejects_bad_input() {
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("1,2,0,4").is_err());
        assert!(parse_region("a,b,c,d").is_err());
    }

    #[test]
    fn args_parse_modes_and_providers() {
        let args = Args::try_parse_from(["screen-prompt", "-m", "stable-diffusion", "-p", "gemini", "--region", "0,0,10,10"])
            .unwrap();
        assert_eq!(args.mode, Some(GenerationMode::StableDiffusion));
        assert_eq!(args.provider, Some(ProviderKind::Gemini));
        assert!(args.region.is_some());
    }

    #[test]
    fn dpr_requires_region() {
        assert!(Args::try_parse_from(["screen-prompt", "--dpr", "2"]).is_err());
        assert!(Args::try_parse_from(["screen-prompt", "-m", "poetry"]).is_err());
    }
}
