use anyhow::Result;
use clap::Parser;
use clprobe::{filter::ExclusionSet, probe::ProbeOptions, report::Report};
use env_logger::Env;

/// Lists the OpenCL platforms and devices and checks that each device can run a kernel.
#[derive(Parser, Debug)]
#[command(name = "clprobe")]
struct Cli {
    /// don't probe platform/device with given name
    #[arg(long = "blacklist", value_name = "NAME")]
    blacklist: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    for name in cli.blacklist.iter() {
        println!("blacklist: {name}");
    }
    let exclusions = ExclusionSet::new(cli.blacklist);
    let options = ProbeOptions::from_env()?;
    log::debug!("{options:?}");
    print!("{}", probe(exclusions, options));
    Ok(())
}

#[cfg(feature = "device")]
fn probe(exclusions: ExclusionSet, options: ProbeOptions) -> Report {
    use clprobe::{device::OclBackend, probe::Prober};

    Prober::new(OclBackend::new(), exclusions, options).run()
}

/// Built without a backend, nothing to enumerate.
#[cfg(not(feature = "device"))]
fn probe(_exclusions: ExclusionSet, _options: ProbeOptions) -> Report {
    let error = clprobe::device::error::DeviceUnavailable;
    log::warn!("{error}, rebuild with the \"device\" feature to probe OpenCL");
    Report::failed(error)
}
