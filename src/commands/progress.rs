//! Progress reporting with indicatif

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;
use wincflash_core::{FlashProgress, FlashState, FlashStats};

/// Progress reporter using indicatif progress bars
pub struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
        }
    }

    fn create_bar(&mut self, total: u64, phase: &'static str) {
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                    phase
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.current_bar = Some(pb);
    }

    pub fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    pub fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    fn abandon(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon_with_message(message.to_string());
        }
    }

    fn set_position(&self, pos: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(pos as u64);
        }
    }
}

impl FlashProgress for IndicatifProgress {
    fn state_changed(&mut self, state: FlashState) {
        if state == FlashState::Failed {
            self.abandon("Failed");
        }
    }

    fn erasing(&mut self, address: u32, bytes: usize) {
        self.create_spinner(format!("Erasing {} bytes at 0x{:08X}...", bytes, address));
    }

    fn writing(&mut self, total_bytes: usize) {
        self.finish("Erase complete");
        self.create_bar(total_bytes as u64, "Writing");
    }

    fn write_progress(&mut self, bytes_written: usize) {
        self.set_position(bytes_written);
    }

    fn reading(&mut self, total_bytes: usize) {
        self.finish("Write complete");
        self.create_bar(total_bytes as u64, "Reading");
    }

    fn read_progress(&mut self, bytes_read: usize) {
        self.set_position(bytes_read);
    }

    fn verifying(&mut self) {
        self.finish("Read complete");
        self.create_spinner("Verifying...".to_string());
    }

    fn complete(&mut self, stats: &FlashStats) {
        self.finish("Verification passed");
        println!(
            "Flashed {} bytes in {} chunks ({} bytes erased, {} bytes read back)",
            stats.bytes_written, stats.chunks, stats.bytes_erased, stats.bytes_read
        );
    }
}
