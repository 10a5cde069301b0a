//! inkbind – command-line EPUB / plain-text → PDF converter.
//!
//! Usage:
//!   inkbind <input.epub|input.txt> [--toc] [--toc-numbers] [--toc-start N]
//!           [--no-page-numbers] [--save-settings]
//!
//! The PDF is written next to the input file with the same stem
//! (e.g. `book.epub` → `book.pdf`). Flags override the persisted settings
//! for this run; `--save-settings` writes the effective settings back so
//! they become the new defaults.

use std::{env, path::PathBuf, process};

use inkbind::job::{spawn, JobEvent};
use inkbind::render::FlowRenderer;
use inkbind::settings::{default_settings_path, ConversionSettings};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let settings_path = default_settings_path();
    let mut settings = match &settings_path {
        Some(path) => ConversionSettings::load_or_default(path),
        None => ConversionSettings::default(),
    };

    let mut input_path: Option<PathBuf> = None;
    let mut save_settings = false;

    let mut iter = args.iter().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--toc" => settings.toc = true,
            "--toc-numbers" => {
                settings.toc = true;
                settings.toc_numbers = true;
            }
            "--no-page-numbers" => settings.page_numbers = false,
            "--toc-start" => match iter.next().and_then(|v| v.parse::<usize>().ok()) {
                Some(n) if n >= 1 => settings.toc_start_page = n,
                _ => {
                    eprintln!("Error: --toc-start expects a positive integer.");
                    process::exit(1);
                }
            },
            "--save-settings" => save_settings = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if input_path.is_some() {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                input_path = Some(PathBuf::from(path));
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    if save_settings {
        if let Some(path) = &settings_path {
            if let Err(e) = settings.save(path) {
                eprintln!("Warning: could not save settings to '{}': {e}", path.display());
            }
        }
    }

    let events = spawn(input, settings, FlowRenderer::default());
    for event in events {
        match event {
            JobEvent::Progress(percent) => eprint!("\rconverting... {percent:>3}%"),
            JobEvent::Done(output) => {
                eprintln!("\rWrote '{}'          ", output.display());
                return;
            }
            JobEvent::Failed(message) => {
                eprintln!("\rError: {message}");
                process::exit(1);
            }
        }
    }

    // The worker hung up without a terminal event; treat it as a failure.
    eprintln!("\rError: conversion ended unexpectedly.");
    process::exit(1);
}

fn print_usage(program: &str) {
    eprintln!(
        "Usage: {program} <input.epub|input.txt> [options]\n\
         \n\
         Options:\n\
           --toc               generate a table of contents\n\
           --toc-numbers       print page numbers in the table of contents (implies --toc)\n\
           --toc-start N       first page number of the body text (default 1)\n\
           --no-page-numbers   omit page-number footers\n\
           --save-settings     persist the effective settings as the new defaults\n\
           -h, --help          show this help"
    );
}
