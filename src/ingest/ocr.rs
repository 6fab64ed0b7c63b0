//! OCR through the `tesseract` command line tool.
//!
//! The image is piped to `tesseract stdin stdout` as PNG. The subprocess is
//! killed if it runs past the configured timeout, whether or not it has
//! consumed its input.

use image::DynamicImage;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::OcrConfig;
use crate::ingest::{images, IngestError, OcrEngine};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct TesseractOcr {
    binary: String,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn wait_with_deadline(&self, child: &mut Child) -> Result<ExitStatus, IngestError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(IngestError::Ocr(format!(
                    "{} did not finish within {:?}",
                    self.binary, self.timeout
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn extract(&self, image: &DynamicImage) -> Result<String, IngestError> {
        // tesseract works on RGB input
        let png = images::encode_png(&DynamicImage::ImageRgb8(image.to_rgb8()))?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| IngestError::Ocr(format!("failed to run {}: {e}", self.binary)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| IngestError::Ocr("stdin not captured".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| IngestError::Ocr("stdout not captured".to_string()))?;

        // both pipes are serviced off-thread so a child that stops reading
        // cannot stall us past the deadline
        let writer = thread::spawn(move || stdin.write_all(&png));
        let reader = thread::spawn(move || {
            let mut out = String::new();
            stdout.read_to_string(&mut out).map(|_| out)
        });

        let status = self.wait_with_deadline(&mut child)?;

        let written = writer
            .join()
            .map_err(|_| IngestError::Ocr("input writer panicked".to_string()))?;
        let text = reader
            .join()
            .map_err(|_| IngestError::Ocr("output reader panicked".to_string()))??;

        if !status.success() {
            return Err(IngestError::Ocr(format!("{} exited with {status}", self.binary)));
        }
        if let Err(e) = written {
            return Err(IngestError::Ocr(format!(
                "{} did not accept the image: {e}",
                self.binary
            )));
        }

        Ok(text.trim().to_string())
    }
}
