// Copyright (c) Recovery Bench Developers.
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::time::Duration;

pub struct BenchProgress {
    bar: Option<ProgressBar>,
}

impl BenchProgress {
    pub fn new() -> Self {
        if !console::user_attended_stderr() {
            return Self { bar: None };
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}")
        {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(200));
        Self { bar: Some(bar) }
    }

    pub fn set_prefix(&self, prefix: &str) {
        if let Some(bar) = self.bar.as_ref() {
            bar.set_prefix(prefix.to_string());
        }
    }

    pub fn set_status(&self, status: &str) {
        match self.bar.as_ref() {
            Some(bar) => bar.set_message(status.to_string()),
            None => info!("{}", status),
        }
    }

    pub fn println(&self, msg: &str) {
        match self.bar.as_ref() {
            Some(bar) => bar.println(msg),
            None => info!("{}", msg),
        }
    }
}

impl Drop for BenchProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
