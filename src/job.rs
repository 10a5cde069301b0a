//! Background conversion job.
//!
//! One job runs the whole pipeline on a dedicated thread and talks back to
//! the interactive side through a one-directional event channel: progress
//! percentages while running, then exactly one terminal event. There is no
//! cancellation; callers must not start a second job until the terminal
//! event of the first arrives.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use log::error;

use crate::pipeline::{convert, ProgressSink};
use crate::render::PageRenderer;
use crate::settings::ConversionSettings;

/// Notifications emitted by a running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Non-decreasing percentage, 0–100.
    Progress(u8),
    /// Terminal: conversion succeeded, output written here.
    Done(PathBuf),
    /// Terminal: conversion failed with a human-readable message.
    Failed(String),
}

struct ChannelProgress {
    tx: Sender<JobEvent>,
}

impl ProgressSink for ChannelProgress {
    fn percent(&mut self, value: u8) {
        // The receiver hanging up just means nobody is watching anymore.
        let _ = self.tx.send(JobEvent::Progress(value));
    }
}

/// Start a conversion job on a background thread.
///
/// The returned receiver yields [`JobEvent::Progress`] updates followed by
/// exactly one [`JobEvent::Done`] or [`JobEvent::Failed`].
pub fn spawn<R>(input: PathBuf, settings: ConversionSettings, renderer: R) -> Receiver<JobEvent>
where
    R: PageRenderer + Send + 'static,
{
    let (tx, rx) = channel();
    thread::spawn(move || {
        let mut progress = ChannelProgress { tx: tx.clone() };
        match convert(&input, &settings, &renderer, &mut progress) {
            Ok(output) => {
                let _ = tx.send(JobEvent::Done(output));
            }
            Err(e) => {
                error!("conversion of {} failed: {e}", input.display());
                let _ = tx.send(JobEvent::Failed(e.to_string()));
            }
        }
    });
    rx
}
