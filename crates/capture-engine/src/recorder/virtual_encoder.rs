//! In-process encoder that records every call.
//!
//! Stands in for a hardware encoder in tests and simulations. On `stop`
//! it writes an empty placeholder at the output path so callers can see
//! a finalized file appear.

use std::sync::Arc;

use parking_lot::Mutex;
use vidcap_common::error::{VidcapError, VidcapResult};

use super::{Encoder, EncoderBackend, EncoderSettings};
use crate::sink::Surface;

/// One call observed by a virtual encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderCall {
    Create,
    Prepare(EncoderSettings),
    Start,
    Stop,
    Reset,
    Release,
}

#[derive(Debug, Default)]
struct EncoderLog {
    calls: Vec<EncoderCall>,
    fail_prepare: bool,
    fail_start: bool,
}

/// Factory for [`VirtualEncoder`]s sharing one call log.
#[derive(Debug, Clone, Default)]
pub struct VirtualEncoderBackend {
    log: Arc<Mutex<EncoderLog>>,
}

impl VirtualEncoderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_prepare(&self, fail: bool) {
        self.log.lock().fail_prepare = fail;
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.log.lock().fail_start = fail;
    }

    pub fn calls(&self) -> Vec<EncoderCall> {
        self.log.lock().calls.clone()
    }

    pub fn encoders_created(&self) -> usize {
        self.log
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, EncoderCall::Create))
            .count()
    }
}

impl EncoderBackend for VirtualEncoderBackend {
    fn name(&self) -> &str {
        "virtual"
    }

    fn create_encoder(&self) -> VidcapResult<Box<dyn Encoder>> {
        self.log.lock().calls.push(EncoderCall::Create);
        Ok(Box::new(VirtualEncoder {
            log: self.log.clone(),
            settings: None,
            started: false,
        }))
    }
}

struct VirtualEncoder {
    log: Arc<Mutex<EncoderLog>>,
    settings: Option<EncoderSettings>,
    started: bool,
}

impl Encoder for VirtualEncoder {
    fn prepare(&mut self, settings: &EncoderSettings) -> VidcapResult<Surface> {
        let mut log = self.log.lock();
        log.calls.push(EncoderCall::Prepare(settings.clone()));
        if log.fail_prepare {
            return Err(VidcapError::encoder("prepare rejected"));
        }
        self.settings = Some(settings.clone());
        Ok(Surface::new(settings.video_size))
    }

    fn start(&mut self) -> VidcapResult<()> {
        let mut log = self.log.lock();
        log.calls.push(EncoderCall::Start);
        if log.fail_start {
            return Err(VidcapError::encoder("start rejected"));
        }
        if self.settings.is_none() {
            return Err(VidcapError::encoder("start before prepare"));
        }
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> VidcapResult<()> {
        self.log.lock().calls.push(EncoderCall::Stop);
        if !self.started {
            return Err(VidcapError::encoder("stop before start"));
        }
        self.started = false;
        if let Some(ref settings) = self.settings {
            std::fs::write(&settings.output_path, b"")?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.log.lock().calls.push(EncoderCall::Reset);
        self.settings = None;
        self.started = false;
    }

    fn release(&mut self) {
        self.log.lock().calls.push(EncoderCall::Release);
        self.settings = None;
        self.started = false;
    }
}
