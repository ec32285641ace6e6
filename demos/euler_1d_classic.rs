use hetstep::classic_example::*;
use hetstep::config::RunConfig;
use hetstep::driver::*;
use hetstep::output::*;
use hetstep::stencil::standard_stencils::euler_1d;
use hetstep::util::*;
use std::sync::Arc;

const GAMMA: f64 = 1.4;

fn main() -> hetstep::Result<()> {
    let (args, output_image_path) = Args::cli_parse("euler_1d_classic")?;

    #[cfg(feature = "profile-with-puffin")]
    let _puffin_server = start_profiler()?;

    let (layouts, devices) = args.decomposition()?;
    let template = RunConfig {
        state_size: state_size::<Vector3<f64>>(),
        ..args.template()
    };
    let rule = Arc::new(euler_1d(args.dt, 1.0, GAMMA));

    // shock tube, the initial condition flag does not apply
    let middle = args.domain_size / 2;
    let ic = move |position: usize| {
        let (rho, pressure) = if position < middle {
            (1.0, 1.0)
        } else {
            (0.125, 0.1)
        };
        Vector3::new(rho, 0.0, pressure / (GAMMA - 1.0))
    };

    let outcomes = run_chain(&layouts, &template, rule, devices, ic)?;

    log_timing(&outcomes);
    let mut timing_path = args.output_dir.clone();
    timing_path.push("timing.csv");
    args.write_timing_file(&timing_path, &layouts, &outcomes)?;

    let mut csv_path = args.output_dir.clone();
    csv_path.push("euler_1d_classic.csv");
    let mut csv = CsvSink::create(&csv_path)?;
    for o in &outcomes {
        replay(&o.records, &mut csv)?;
    }
    csv.into_inner()?;

    if args.write_image {
        let mut image =
            ImageSink::new(args.domain_size, (0.0, 1.0), |v: &Vector3<f64>| v[0]);
        for o in &outcomes {
            replay(&o.records, &mut image)?;
        }
        image.write(&output_image_path)?;
    }

    let mass: f64 = gather_global(&outcomes).iter().map(|v| v[0]).sum();
    tracing::info!(mass, "final state");
    Ok(())
}
