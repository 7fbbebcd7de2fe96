/*!
Kernel self-test and the probe driver.

A device passes when the [`KERNEL_SRC`] program builds, the `rot13` kernel
runs over [`SELF_TEST_INPUT`] without error, and the bytes read back equal the
host [`transform`](crate::transform::transform) of the input. Each test uses
its own engine, nothing is shared between devices.

Failures are reported as a [`Verdict`], they never abort the probe.
*/

use crate::{
    device::{list_devices, list_platforms, Backend, Device, DeviceEngine, Platform},
    filter::ExclusionSet,
    report::{DeviceReport, PlatformReport, Report},
    result::Result,
    transform::transform,
};
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use std::{
    fmt::{self, Display},
    time::Duration,
};

/// Errors.
pub mod error {
    /// An environment variable could not be parsed.
    #[derive(Clone, Debug, thiserror::Error)]
    #[error("Invalid value {value:?} for {var}!")]
    pub struct InvalidEnvVar {
        pub(super) var: &'static str,
        pub(super) value: String,
    }
}
use error::InvalidEnvVar;

/// Name of the self-test kernel.
pub const KERNEL_NAME: &str = "rot13";

/// OpenCL C source of the self-test program.
pub const KERNEL_SRC: &str = r#"
kernel void rot13(global const uchar* x, global uchar* y) {
    const size_t idx = get_global_id(0);
    const uchar c = x[idx];
    if (c >= 'A' && c <= 'Z') {
        y[idx] = 'A' + (c - 'A' + 13) % 26;
    } else if (c >= 'a' && c <= 'z') {
        y[idx] = 'a' + (c - 'a' + 13) % 26;
    } else {
        y[idx] = c;
    }
}
"#;

/// Input of the self-test.
pub const SELF_TEST_INPUT: &[u8; 12] = b"blahblahblah";

/// Enables the self-test, `0` or `false` disables it.
pub const SELF_TEST_VAR: &str = "CLPROBE_SELF_TEST";
/// Dispatch timeout in milliseconds, `0` waits forever.
pub const DISPATCH_TIMEOUT_VAR: &str = "CLPROBE_DISPATCH_TIMEOUT_MS";

/// Options for [`Prober`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeOptions {
    self_test: bool,
    dispatch_timeout: Option<Duration>,
}

impl ProbeOptions {
    pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);
    /// Whether devices are self-tested, defaults to true.
    pub fn self_test(self, self_test: bool) -> Self {
        Self { self_test, ..self }
    }
    /** How long to wait for the dispatch and read back, defaults to
    [`DEFAULT_DISPATCH_TIMEOUT`](Self::DEFAULT_DISPATCH_TIMEOUT).

    `None` waits forever. */
    pub fn dispatch_timeout(self, dispatch_timeout: Option<Duration>) -> Self {
        Self {
            dispatch_timeout,
            ..self
        }
    }
    pub fn is_self_test(&self) -> bool {
        self.self_test
    }
    pub fn get_dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout
    }
    /** The defaults, overridden by [`SELF_TEST_VAR`] and
    [`DISPATCH_TIMEOUT_VAR`].

    **errors**
    - [`InvalidEnvVar`]: A variable is set but can not be parsed. */
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|var| std::env::var(var).ok())
    }
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();
        if let Some(value) = var(SELF_TEST_VAR) {
            let self_test = match value.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => {
                    return Err(InvalidEnvVar {
                        var: SELF_TEST_VAR,
                        value,
                    }
                    .into())
                }
            };
            options = options.self_test(self_test);
        }
        if let Some(value) = var(DISPATCH_TIMEOUT_VAR) {
            let millis: u64 = value.trim().parse().map_err(|_| InvalidEnvVar {
                var: DISPATCH_TIMEOUT_VAR,
                value: value.clone(),
            })?;
            let timeout = (millis > 0).then(|| Duration::from_millis(millis));
            options = options.dispatch_timeout(timeout);
        }
        Ok(options)
    }
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            self_test: true,
            dispatch_timeout: Some(Self::DEFAULT_DISPATCH_TIMEOUT),
        }
    }
}

/// Why a device that built the program failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mismatch {
    /// The engine or the buffers could not be created.
    Setup(String),
    /// The dispatch or the read back returned an error.
    Dispatch(String),
    /// The output differs from the host.
    Output { expected: Vec<u8>, actual: Vec<u8> },
    /// The dispatch did not finish in time.
    TimedOut(Duration),
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(e) => write!(f, "setup failed: {e}"),
            Self::Dispatch(e) => write!(f, "dispatch failed: {e}"),
            Self::Output { expected, actual } => write!(
                f,
                "expected {:?}, found {:?}",
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(actual)
            ),
            Self::TimedOut(timeout) => write!(f, "timed out after {timeout:?}"),
        }
    }
}

/// Outcome of the self-test of one device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, derive_more::IsVariant)]
#[serde(tag = "verdict", content = "detail", rename_all = "kebab-case")]
pub enum Verdict {
    /// Excluded, or the self-test is disabled.
    NotRun,
    Pass,
    /// The program did not build.
    FailBuild { log: String },
    /// The kernel did not produce the expected output.
    FailMismatch(Mismatch),
}

impl Verdict {
    /// "OK" or "broken", `None` if not run.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::NotRun => None,
            Self::Pass => Some("OK"),
            Self::FailBuild { .. } | Self::FailMismatch(_) => Some("broken"),
        }
    }
}

/** Self-tests a device with its own engine.

The verdict is final once this returns, including the captured build log. */
pub fn run_self_test<B: Backend>(
    backend: &B,
    platform: &Platform<B::Platform>,
    device: &Device<B::Device>,
    options: &ProbeOptions,
) -> Verdict {
    let engine = match backend.engine(platform.handle(), device.handle()) {
        Ok(engine) => engine,
        Err(e) => return Verdict::FailMismatch(Mismatch::Setup(format!("{e:#}"))),
    };
    self_test(engine, options.dispatch_timeout)
}

/** Self-tests the device of `engine`.

1. Builds [`KERNEL_SRC`]. On failure the build log is logged and returned as
   [`Verdict::FailBuild`], no buffers are created.
2. Uploads [`SELF_TEST_INPUT`] and allocates the output.
3. Dispatches one work-item per byte and reads the output back, waiting at most
   `timeout`. The engine is moved to a worker thread for this step, a hung
   worker is abandoned.
4. Compares with the host transform of the input. */
pub fn self_test<E: DeviceEngine>(engine: E, timeout: Option<Duration>) -> Verdict {
    let program = match engine.build_program(KERNEL_SRC) {
        Ok(program) => program,
        Err(e) => {
            log::error!("Build Log: {}", e.log);
            return Verdict::FailBuild { log: e.log };
        }
    };
    let input = SELF_TEST_INPUT.as_slice();
    let expected = transform(input);
    let buffers = engine
        .upload(input)
        .and_then(|x| Ok((x, engine.alloc(input.len())?)));
    let (x, y) = match buffers {
        Ok(buffers) => buffers,
        Err(e) => return Verdict::FailMismatch(Mismatch::Setup(format!("{e:#}"))),
    };
    let (sender, receiver) = crossbeam_channel::bounded(1);
    let worker = std::thread::Builder::new()
        .name("clprobe-dispatch".into())
        .spawn(move || {
            let result = engine
                .dispatch(&program, KERNEL_NAME, input.len(), &[&x, &y])
                .and_then(|()| engine.download(&y));
            // The receiver is gone if the runner timed out.
            let _ = sender.send(result);
        });
    if let Err(e) = worker {
        return Verdict::FailMismatch(Mismatch::Setup(e.to_string()));
    }
    let worker_panicked =
        || Verdict::FailMismatch(Mismatch::Dispatch("dispatch worker panicked".into()));
    let result = match timeout {
        Some(timeout) => match receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Dispatch timed out after {timeout:?}");
                return Verdict::FailMismatch(Mismatch::TimedOut(timeout));
            }
            Err(RecvTimeoutError::Disconnected) => return worker_panicked(),
        },
        None => match receiver.recv() {
            Ok(result) => result,
            Err(_) => return worker_panicked(),
        },
    };
    let actual = match result {
        Ok(actual) => actual,
        Err(e) => return Verdict::FailMismatch(Mismatch::Dispatch(format!("{e:#}"))),
    };
    if actual == expected {
        Verdict::Pass
    } else {
        Verdict::FailMismatch(Mismatch::Output { expected, actual })
    }
}

/** Enumerates, filters and self-tests.

```no_run
# use clprobe::{filter::ExclusionSet, probe::{Prober, ProbeOptions}};
# #[cfg(feature = "device")]
# {
let prober = Prober::new(
    clprobe::device::OclBackend::new(),
    ExclusionSet::default(),
    ProbeOptions::default().self_test(false),
);
let report = prober.run();
assert_eq!(report.platforms.len(), report.platform_count());
# }
```
*/
pub struct Prober<B> {
    backend: B,
    exclusions: ExclusionSet,
    options: ProbeOptions,
}

impl<B: Backend> Prober<B> {
    pub fn new(backend: B, exclusions: ExclusionSet, options: ProbeOptions) -> Self {
        Self {
            backend,
            exclusions,
            options,
        }
    }
    pub fn backend(&self) -> &B {
        &self.backend
    }
    fn is_excluded(&self, name: Option<&str>) -> bool {
        name.map_or(false, |name| self.exclusions.is_excluded(name))
    }
    /** Probes every platform and device in discovery order.

    A failure to list the platforms is recorded in [`Report::error`] and yields
    no platforms. */
    pub fn run(&self) -> Report {
        match list_platforms(&self.backend) {
            Ok(platforms) => Report {
                platforms: platforms.iter().map(|x| self.probe_platform(x)).collect(),
                error: None,
            },
            Err(e) => {
                log::warn!("Failed to list platforms: {e:#}");
                Report::failed(format_args!("{e:#}"))
            }
        }
    }
    fn probe_platform(&self, platform: &Platform<B::Platform>) -> PlatformReport {
        let info = platform.info().clone();
        let excluded = self.is_excluded(info.name.as_deref());
        if excluded {
            log::info!("platform[{}] excluded", platform.index());
            // Counted but not listed.
            let device_count = match self.backend.devices(platform.handle()) {
                Ok(devices) => Some(devices.len()),
                Err(e) => {
                    log::warn!("platform[{}] devices unavailable: {e:#}", platform.index());
                    None
                }
            };
            return PlatformReport {
                index: platform.index(),
                info,
                excluded,
                device_count,
                devices: Vec::new(),
            };
        }
        let devices = match list_devices(&self.backend, platform) {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("platform[{}] devices unavailable: {e:#}", platform.index());
                return PlatformReport {
                    index: platform.index(),
                    info,
                    excluded,
                    device_count: None,
                    devices: Vec::new(),
                };
            }
        };
        PlatformReport {
            index: platform.index(),
            info,
            excluded,
            device_count: Some(devices.len()),
            devices: devices
                .iter()
                .map(|device| self.probe_device(platform, device))
                .collect(),
        }
    }
    fn probe_device(
        &self,
        platform: &Platform<B::Platform>,
        device: &Device<B::Device>,
    ) -> DeviceReport {
        let info = device.info().clone();
        let excluded = self.is_excluded(info.name.as_deref());
        let verdict = if excluded || !self.options.self_test {
            Verdict::NotRun
        } else {
            log::debug!(
                "platform[{}] device[{}] self-test",
                platform.index(),
                device.index()
            );
            run_self_test(&self.backend, platform, device, &self.options)
        };
        match &verdict {
            Verdict::FailMismatch(mismatch) => log::debug!(
                "platform[{}] device[{}] broken: {mismatch}",
                platform.index(),
                device.index()
            ),
            verdict => log::debug!(
                "platform[{}] device[{}] {verdict:?}",
                platform.index(),
                device.index()
            ),
        }
        DeviceReport {
            index: device.index(),
            info,
            excluded,
            verdict,
        }
    }
}
