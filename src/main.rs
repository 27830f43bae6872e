use clap::Parser;
use colored::Colorize;
use gostbib::format::GostStyle;
use gostbib::grobid::DEFAULT_GROBID_URL;
use gostbib::{Pipeline, PipelineConfig};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "gostbib")]
#[command(version = "0.1.0")]
#[command(about = "Clean a messy bibliography list and format it per GOST via GROBID", long_about = None)]
struct Args {
    /// Input file with the pasted bibliography; reads stdin when omitted
    input: Option<PathBuf>,

    /// GOST style: gost-2008 or gost-2018
    #[arg(long, short, default_value = "gost-2018")]
    style: String,

    /// GROBID service URL
    #[arg(long, default_value = DEFAULT_GROBID_URL)]
    grobid_url: String,

    /// Only clean and split the text; no service calls
    #[arg(long)]
    clean_only: bool,

    /// Check GROBID availability and exit
    #[arg(long)]
    check: bool,

    /// Emit JSON instead of the colored report
    #[arg(long)]
    json: bool,

    /// Strict mode: exit with error code if any line failed or warned
    #[arg(long, short = 'S')]
    strict: bool,

    /// Verbose output
    #[arg(long, short)]
    verbose: bool,
}

fn read_input(input: Option<&PathBuf>) -> Result<String, String> {
    match input {
        Some(path) => {
            if !path.exists() {
                return Err(format!("File not found: {}", path.display()));
            }
            std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| format!("stdin: {}", e))?;
            Ok(text)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("gostbib=debug")
            .init();
    }

    let style: GostStyle = match args.style.parse() {
        Ok(style) => style,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let config = PipelineConfig {
        grobid_url: args.grobid_url,
        style,
        show_progress: !args.json,
    };
    let pipeline = Pipeline::new(config);

    if args.check {
        let status = pipeline.check_service().await;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&status).unwrap());
        } else if status.available {
            println!("{} {}", "✓".green().bold(), status.message);
        } else {
            println!("{} {}", "✗".red().bold(), status.message);
        }
        return if status.available {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let text = match read_input(args.input.as_ref()) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    if args.clean_only {
        let preview = pipeline.clean_preview(&text);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&preview).unwrap());
        } else {
            println!("{}", preview.cleaned);
        }
        return ExitCode::SUCCESS;
    }

    let summary = pipeline.process(&text).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary).unwrap());
    } else {
        summary.print();
    }

    if args.strict && (summary.count_failed() > 0 || summary.total_warnings > 0) {
        ExitCode::FAILURE
    } else if summary.count_failed() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
