/*!
Report records and the console format.

```text
got 1 platforms

- platform[0]
  - name:    Portable Computing Language
  - profile: FULL_PROFILE
  - version: OpenCL 3.0 PoCL 5.0
  - vendor:  The pocl project
  - devices: 1
    - device[0]
      - name:   cpu-haswell-AMD Ryzen 7 5800X 8-Core Processor
      - type:   CPU
      - units:  16
      - mem:    30739660800
      - status: OK
```

Unavailable attributes print as "unavailable". Excluded platforms print the
header only, excluded devices are skipped and the status is omitted for
devices that were not tested.
*/

use crate::{
    device::{DeviceInfo, PlatformInfo},
    probe::Verdict,
};
use serde::Serialize;
use std::fmt::{self, Display};

/// The probe of every platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Platforms in discovery order.
    pub platforms: Vec<PlatformReport>,
    /// Set if the platforms could not be listed.
    pub error: Option<String>,
}

impl Report {
    /// No platforms, only `error`.
    pub fn failed(error: impl Display) -> Self {
        Self {
            platforms: Vec::new(),
            error: Some(error.to_string()),
        }
    }
    pub fn platform_count(&self) -> usize {
        self.platforms.len()
    }
    /// Devices of all platforms.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceReport> + '_ {
        self.platforms.iter().flat_map(|x| x.devices.iter())
    }
    /// Tested devices that did not pass.
    pub fn broken_devices(&self) -> impl Iterator<Item = &DeviceReport> + '_ {
        self.devices()
            .filter(|x| x.verdict.is_fail_build() || x.verdict.is_fail_mismatch())
    }
}

/// One platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlatformReport {
    pub index: usize,
    pub info: PlatformInfo,
    /// The name is in the exclusion set, no devices are listed.
    pub excluded: bool,
    /// `None` if the devices could not be listed.
    pub device_count: Option<usize>,
    /// Devices in discovery order, empty if excluded.
    pub devices: Vec<DeviceReport>,
}

/// One device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub index: usize,
    pub info: DeviceInfo,
    /// The name is in the exclusion set.
    pub excluded: bool,
    pub verdict: Verdict,
}

impl DeviceReport {
    /// See [`Verdict::label`].
    pub fn status(&self) -> Option<&'static str> {
        self.verdict.label()
    }
}

struct Attr<'a, T>(&'a Option<T>);

impl<T: Display> Display for Attr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => value.fmt(f),
            None => f.write_str("unavailable"),
        }
    }
}

impl Display for PlatformReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = &self.info;
        writeln!(f, "- platform[{}]", self.index)?;
        writeln!(f, "  - name:    {}", Attr(&info.name))?;
        writeln!(f, "  - profile: {}", Attr(&info.profile))?;
        writeln!(f, "  - version: {}", Attr(&info.version))?;
        writeln!(f, "  - vendor:  {}", Attr(&info.vendor))?;
        writeln!(f, "  - devices: {}", Attr(&self.device_count))?;
        for device in self.devices.iter().filter(|x| !x.excluded) {
            device.fmt(f)?;
        }
        Ok(())
    }
}

impl Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = &self.info;
        writeln!(f, "    - device[{}]", self.index)?;
        writeln!(f, "      - name:   {}", Attr(&info.name))?;
        writeln!(f, "      - type:   {}", Attr(&info.kind))?;
        writeln!(f, "      - units:  {}", Attr(&info.compute_units))?;
        writeln!(f, "      - mem:    {}", Attr(&info.global_mem_size))?;
        if let Some(status) = self.status() {
            writeln!(f, "      - status: {status}")?;
        }
        Ok(())
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "got {} platforms", self.platform_count())?;
        writeln!(f)?;
        for platform in self.platforms.iter() {
            platform.fmt(f)?;
        }
        Ok(())
    }
}
