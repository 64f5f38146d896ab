use std::fmt;
use std::time::Duration;

use faceverify_vision::{CaptureBackend, FrameSource, SnapshotEncoder, V4lBackend};
use log::{debug, info, warn};

use crate::config::Options;
use crate::error::{Result, VerifyError};
use crate::facebox::{CheckResponse, FaceboxClient, Verify};

/// Why a cycle was not secure. Service failures go to the error callback instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsecureReason {
    NoFaces,
    MultipleFaces,
    NotRecognized,
}

impl fmt::Display for InsecureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InsecureReason::NoFaces => "no faces detected",
            InsecureReason::MultipleFaces => "multiple faces detected",
            InsecureReason::NotRecognized => "not recognized",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Secure(String),
    Insecure(InsecureReason),
}

/// Secure only for exactly one face that matched a known identity.
pub fn classify(resp: &CheckResponse) -> Verdict {
    match resp.faces_count {
        0 => Verdict::Insecure(InsecureReason::NoFaces),
        1 => match resp.faces.first() {
            Some(face) if face.matched => Verdict::Secure(face.name.clone()),
            _ => Verdict::Insecure(InsecureReason::NotRecognized),
        },
        _ => Verdict::Insecure(InsecureReason::MultipleFaces),
    }
}

/// Outcome handlers. `error(None)` signals that a previous error has cleared.
pub struct Callbacks {
    on_secure: Box<dyn FnMut(&str)>,
    on_insecure: Box<dyn FnMut(InsecureReason)>,
    error: Box<dyn FnMut(Option<&str>)>,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            on_secure: Box::new(|_| {}),
            on_insecure: Box::new(|_| {}),
            error: Box::new(|msg| {
                if let Some(msg) = msg {
                    warn!("{}", msg);
                }
            }),
        }
    }
}

impl Callbacks {
    pub fn on_secure(mut self, f: impl FnMut(&str) + 'static) -> Self {
        self.on_secure = Box::new(f);
        self
    }

    pub fn on_insecure(mut self, f: impl FnMut(InsecureReason) + 'static) -> Self {
        self.on_insecure = Box::new(f);
        self
    }

    pub fn on_error(mut self, f: impl FnMut(Option<&str>) + 'static) -> Self {
        self.error = Box::new(f);
        self
    }

    fn report(&mut self, err: &VerifyError) {
        let msg = err.to_string();
        (self.error)(Some(&msg));
    }
}

pub trait Timer {
    fn sleep(&mut self, interval: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTimer;

impl Timer for ThreadTimer {
    fn sleep(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

/// Idle capture-and-verify loop. [`FaceVerify::start`] moves it to [`Polling`].
pub struct FaceVerify {
    options: Options,
    callbacks: Callbacks,
    backend: Box<dyn CaptureBackend>,
    verifier: Option<Box<dyn Verify>>,
    timer: Box<dyn Timer>,
    possible: bool,
}

impl FaceVerify {
    /// Video4Linux capture, HTTP Facebox client and a sleeping timer.
    pub fn new(options: Options, callbacks: Callbacks) -> Self {
        let client = FaceboxClient::new(&options.facebox)
            .map(|client| Box::new(client) as Box<dyn Verify>);
        Self::assemble(
            options,
            callbacks,
            Box::new(V4lBackend),
            client,
            Box::new(ThreadTimer),
        )
    }

    /// Setup problems are reported through the error callback and leave the
    /// loop unable to start; they never fail construction.
    pub fn with_parts(
        options: Options,
        callbacks: Callbacks,
        backend: Box<dyn CaptureBackend>,
        verifier: Box<dyn Verify>,
        timer: Box<dyn Timer>,
    ) -> Self {
        Self::assemble(options, callbacks, backend, Ok(verifier), timer)
    }

    fn assemble(
        options: Options,
        mut callbacks: Callbacks,
        backend: Box<dyn CaptureBackend>,
        verifier: Result<Box<dyn Verify>>,
        timer: Box<dyn Timer>,
    ) -> Self {
        let mut possible = true;

        let verifier = match verifier {
            Ok(verifier) => Some(verifier),
            Err(err) => {
                possible = false;
                callbacks.report(&err);
                None
            }
        };

        let target_error = match options.video.as_deref() {
            None => Some(VerifyError::MissingTarget),
            Some(target) if !backend.resolve(target) => {
                Some(VerifyError::TargetNotFound(target.to_string()))
            }
            Some(_) => None,
        };
        if let Some(err) = target_error {
            possible = false;
            callbacks.report(&err);
        }
        if !backend.is_supported() {
            possible = false;
            callbacks.report(&VerifyError::Unsupported);
        }

        Self {
            options,
            callbacks,
            backend,
            verifier,
            timer,
            possible,
        }
    }

    pub fn is_possible(&self) -> bool {
        self.possible
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Acquire the camera. No retry on failure.
    pub fn start(mut self) -> Result<Polling> {
        let (target, verifier) = match (self.options.video.as_deref(), self.verifier.take()) {
            (Some(target), Some(verifier)) if self.possible => (target, verifier),
            _ => {
                self.callbacks.report(&VerifyError::CannotStart);
                return Err(VerifyError::CannotStart);
            }
        };

        let source = match self.backend.acquire(target, self.options.constraints) {
            Ok(source) => source,
            Err(e) => {
                let err = VerifyError::Acquisition(format!("{:#}", e));
                self.callbacks.report(&err);
                return Err(err);
            }
        };
        let (width, height) = source.dimensions();
        info!(
            "Camera {} bound at {}x{}, checking every {:?} against {}",
            target, width, height, self.options.snapshot_interval, self.options.facebox
        );

        Ok(Polling {
            interval: self.options.snapshot_interval,
            callbacks: self.callbacks,
            source,
            encoder: SnapshotEncoder::new(self.options.jpeg_quality),
            verifier,
            timer: self.timer,
        })
    }
}

/// Camera bound, capture cycles repeating. There is no way back to idle.
pub struct Polling {
    interval: Duration,
    callbacks: Callbacks,
    source: Box<dyn FrameSource>,
    encoder: SnapshotEncoder,
    verifier: Box<dyn Verify>,
    timer: Box<dyn Timer>,
}

impl Polling {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one capture cycle and deliver its outcome to the callbacks.
    pub fn snapshot(&mut self) -> Result<Verdict> {
        let outcome = self.cycle();
        match &outcome {
            Ok(verdict) => {
                debug!("cycle verdict: {:?}", verdict);
                (self.callbacks.error)(None);
                match verdict {
                    Verdict::Secure(name) => (self.callbacks.on_secure)(name),
                    Verdict::Insecure(reason) => (self.callbacks.on_insecure)(*reason),
                }
            }
            Err(err) => {
                debug!("cycle failed: {}", err);
                self.callbacks.report(err);
            }
        }
        outcome
    }

    fn cycle(&mut self) -> Result<Verdict> {
        let frame = self
            .source
            .frame()
            .map_err(|e| VerifyError::Capture(format!("{:#}", e)))?;
        let payload = self
            .encoder
            .encode_base64(&frame)
            .map_err(|e| VerifyError::Capture(format!("{:#}", e)))?;
        let resp = self.verifier.check(&payload)?;
        Ok(classify(&resp))
    }

    /// Each cycle starts one interval after the previous one finished,
    /// whatever its outcome.
    pub fn run(mut self) -> ! {
        loop {
            self.timer.sleep(self.interval);
            let _ = self.snapshot();
        }
    }
}
