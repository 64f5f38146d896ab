use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result as AnyResult;
use faceverify::source::StillFrame;
use faceverify::{
    CaptureBackend, Callbacks, CheckResponse, Constraints, Face, FaceVerify, FrameSource,
    InsecureReason, Options, Timer, Verdict, Verify, VerifyError,
};
use image::{Rgb, RgbImage};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Secure(String),
    Insecure(InsecureReason),
    Error(Option<String>),
}

type Log = Rc<RefCell<Vec<Event>>>;

fn recording(log: &Log) -> Callbacks {
    let (a, b, c) = (log.clone(), log.clone(), log.clone());
    Callbacks::default()
        .on_secure(move |name| a.borrow_mut().push(Event::Secure(name.to_string())))
        .on_insecure(move |reason| b.borrow_mut().push(Event::Insecure(reason)))
        .on_error(move |msg| c.borrow_mut().push(Event::Error(msg.map(str::to_string))))
}

struct FakeBackend {
    supported: bool,
    devices: Vec<&'static str>,
    fail_acquire: bool,
    frame_failures: usize,
    acquired: Rc<Cell<usize>>,
    requested: Rc<Cell<Option<Constraints>>>,
}

impl FakeBackend {
    fn with_device(device: &'static str) -> Self {
        Self {
            supported: true,
            devices: vec![device],
            fail_acquire: false,
            frame_failures: 0,
            acquired: Rc::default(),
            requested: Rc::default(),
        }
    }
}

impl CaptureBackend for FakeBackend {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn resolve(&self, target: &str) -> bool {
        self.devices.iter().any(|d| *d == target)
    }

    fn acquire(&self, _target: &str, constraints: Constraints) -> AnyResult<Box<dyn FrameSource>> {
        self.acquired.set(self.acquired.get() + 1);
        self.requested.set(Some(constraints));
        if self.fail_acquire {
            anyhow::bail!("permission denied");
        }
        Ok(Box::new(FlakyFrame {
            failures_left: self.frame_failures,
            still: StillFrame::new(RgbImage::from_pixel(32, 24, Rgb([90, 120, 150]))),
        }))
    }
}

/// Fails the first `failures_left` grabs, then serves a still image.
struct FlakyFrame {
    failures_left: usize,
    still: StillFrame,
}

impl FrameSource for FlakyFrame {
    fn dimensions(&self) -> (u32, u32) {
        self.still.dimensions()
    }

    fn frame(&mut self) -> AnyResult<RgbImage> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            anyhow::bail!("device unplugged");
        }
        self.still.frame()
    }
}

#[derive(Default, Clone)]
struct Scripted {
    replies: Rc<RefCell<VecDeque<Result<CheckResponse, VerifyError>>>>,
    payloads: Rc<RefCell<Vec<String>>>,
}

impl Scripted {
    fn push_ok(&self, resp: CheckResponse) {
        self.replies.borrow_mut().push_back(Ok(resp));
    }

    fn push_err(&self, err: VerifyError) {
        self.replies.borrow_mut().push_back(Err(err));
    }
}

impl Verify for Scripted {
    fn check(&self, base64: &str) -> Result<CheckResponse, VerifyError> {
        self.payloads.borrow_mut().push(base64.to_string());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(VerifyError::Service("no scripted reply".into())))
    }
}

struct RecordingTimer(Rc<RefCell<Vec<Duration>>>);

impl Timer for RecordingTimer {
    fn sleep(&mut self, interval: Duration) {
        self.0.borrow_mut().push(interval);
    }
}

fn faces(faces: Vec<Face>) -> CheckResponse {
    CheckResponse {
        success: true,
        faces_count: faces.len(),
        faces,
        error: None,
    }
}

fn face(matched: bool, name: &str) -> Face {
    Face {
        matched,
        name: name.to_string(),
        ..Face::default()
    }
}

fn options(interval_ms: u64) -> Options {
    Options::new(
        "http://facebox.test",
        Duration::from_millis(interval_ms),
        Some("/dev/video0".to_string()),
    )
}

fn build(opts: Options, backend: FakeBackend, verifier: Scripted, log: &Log) -> FaceVerify {
    FaceVerify::with_parts(
        opts,
        recording(log),
        Box::new(backend),
        Box::new(verifier),
        Box::new(RecordingTimer(Rc::default())),
    )
}

#[test]
fn missing_target_blocks_acquisition() {
    let log = Log::default();
    let backend = FakeBackend::with_device("/dev/video0");
    let acquired = backend.acquired.clone();
    let opts = Options::new("", Duration::ZERO, None);

    let fv = build(opts, backend, Scripted::default(), &log);
    assert!(!fv.is_possible());

    let err = fv.start().err().expect("start must fail");
    assert!(matches!(err, VerifyError::CannotStart));
    assert_eq!(acquired.get(), 0);
    assert_eq!(
        *log.borrow(),
        vec![
            Event::Error(Some(
                "face-verify: must provide a video device via the camera option".into()
            )),
            Event::Error(Some("face-verify: cannot start (see previous errors)".into())),
        ]
    );
}

#[test]
fn unknown_device_blocks_acquisition() {
    let log = Log::default();
    let backend = FakeBackend::with_device("/dev/video1");
    let acquired = backend.acquired.clone();

    let fv = build(options(1000), backend, Scripted::default(), &log);
    assert!(!fv.is_possible());
    assert!(fv.start().is_err());
    assert_eq!(acquired.get(), 0);
    assert_eq!(
        log.borrow()[0],
        Event::Error(Some("face-verify: video device not found: /dev/video0".into()))
    );
}

#[test]
fn unsupported_platform_is_reported_too() {
    let log = Log::default();
    let mut backend = FakeBackend::with_device("/dev/video9");
    backend.supported = false;

    let fv = build(options(1000), backend, Scripted::default(), &log);
    assert!(!fv.is_possible());
    // Both setup problems are reported at construction
    assert_eq!(log.borrow().len(), 2);
    assert_eq!(
        log.borrow()[1],
        Event::Error(Some(
            "face-verify: video capture is not supported on this platform".into()
        ))
    );
}

#[test]
fn acquisition_failure_is_reported_once() {
    let log = Log::default();
    let mut backend = FakeBackend::with_device("/dev/video0");
    backend.fail_acquire = true;
    let acquired = backend.acquired.clone();

    let fv = build(options(1000), backend, Scripted::default(), &log);
    assert!(fv.is_possible());
    let err = fv.start().err().expect("start must fail");
    assert!(matches!(err, VerifyError::Acquisition(_)));
    assert_eq!(acquired.get(), 1);
    assert_eq!(
        *log.borrow(),
        vec![Event::Error(Some(
            "failed to access webcam: permission denied".into()
        ))]
    );
}

#[test]
fn camera_is_requested_with_bounds() {
    let log = Log::default();
    let backend = FakeBackend::with_device("/dev/video0");
    let requested = backend.requested.clone();

    let fv = build(options(1000), backend, Scripted::default(), &log);
    let polling = fv.start().unwrap();
    assert_eq!(polling.interval(), Duration::from_millis(1000));
    assert_eq!(
        requested.get(),
        Some(Constraints {
            max_width: 400,
            max_height: 300
        })
    );
    assert!(log.borrow().is_empty());
}

#[test]
fn verdicts_reach_the_matching_callback() {
    let log = Log::default();
    let verifier = Scripted::default();
    verifier.push_ok(faces(vec![]));
    verifier.push_ok(faces(vec![face(true, "Alice"), face(false, "")]));
    verifier.push_ok(faces(vec![face(false, "")]));
    verifier.push_ok(faces(vec![face(true, "Alice")]));

    let fv = build(
        options(1000),
        FakeBackend::with_device("/dev/video0"),
        verifier.clone(),
        &log,
    );
    let mut polling = fv.start().unwrap();
    for _ in 0..4 {
        polling.snapshot().unwrap();
    }

    assert_eq!(
        *log.borrow(),
        vec![
            Event::Error(None),
            Event::Insecure(InsecureReason::NoFaces),
            Event::Error(None),
            Event::Insecure(InsecureReason::MultipleFaces),
            Event::Error(None),
            Event::Insecure(InsecureReason::NotRecognized),
            Event::Error(None),
            Event::Secure("Alice".into()),
        ]
    );
    let payloads = verifier.payloads.borrow();
    assert_eq!(payloads.len(), 4);
    assert!(payloads.iter().all(|p| !p.is_empty() && !p.starts_with("data:")));
}

#[test]
fn errors_skip_classification() {
    let log = Log::default();
    let verifier = Scripted::default();
    verifier.push_err(VerifyError::BadStatus {
        status: 500,
        body: "boom".into(),
    });
    verifier.push_err(VerifyError::Service("face too small".into()));

    let fv = build(
        options(1000),
        FakeBackend::with_device("/dev/video0"),
        verifier,
        &log,
    );
    let mut polling = fv.start().unwrap();
    assert!(polling.snapshot().is_err());
    assert!(polling.snapshot().is_err());

    assert_eq!(
        *log.borrow(),
        vec![
            Event::Error(Some("bad response from Facebox: boom".into())),
            Event::Error(Some("face too small".into())),
        ]
    );
}

#[test]
fn identical_replies_give_identical_callbacks() {
    let log = Log::default();
    let verifier = Scripted::default();
    for _ in 0..3 {
        verifier.push_ok(faces(vec![face(true, "Bob")]));
    }

    let fv = build(
        options(1000),
        FakeBackend::with_device("/dev/video0"),
        verifier.clone(),
        &log,
    );
    let mut polling = fv.start().unwrap();
    let verdicts: Vec<Verdict> = (0..3).map(|_| polling.snapshot().unwrap()).collect();

    assert!(verdicts.iter().all(|v| *v == Verdict::Secure("Bob".into())));
    let log = log.borrow();
    assert_eq!(log.len(), 6);
    assert_eq!(log[0..2], log[2..4]);
    assert_eq!(log[2..4], log[4..6]);
    // Same frame, same encoder settings, same payload
    let payloads = verifier.payloads.borrow();
    assert!(payloads.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn frame_failure_skips_the_service_and_recovers() {
    let log = Log::default();
    let verifier = Scripted::default();
    verifier.push_ok(faces(vec![face(true, "Alice")]));
    let mut backend = FakeBackend::with_device("/dev/video0");
    backend.frame_failures = 1;

    let fv = build(options(1000), backend, verifier.clone(), &log);
    let mut polling = fv.start().unwrap();

    let err = polling.snapshot().unwrap_err();
    assert!(matches!(err, VerifyError::Capture(_)));
    assert!(verifier.payloads.borrow().is_empty());
    assert_eq!(
        *log.borrow(),
        vec![Event::Error(Some(
            "failed to capture snapshot: device unplugged".into()
        ))]
    );

    assert_eq!(polling.snapshot().unwrap(), Verdict::Secure("Alice".into()));
    assert_eq!(verifier.payloads.borrow().len(), 1);
    assert_eq!(
        log.borrow()[1..],
        [Event::Error(None), Event::Secure("Alice".into())]
    );
}
