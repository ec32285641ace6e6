use hetstep::classic_example::*;
use hetstep::driver::*;
use hetstep::output::*;
use hetstep::stencil::standard_stencils::wave_1d;
use hetstep::util::*;
use std::sync::Arc;

fn main() -> hetstep::Result<()> {
    let (args, output_image_path) = Args::cli_parse("wave_1d_classic")?;

    #[cfg(feature = "profile-with-puffin")]
    let _puffin_server = start_profiler()?;

    let (layouts, devices) = args.decomposition()?;
    let template = hetstep::config::RunConfig {
        state_size: state_size::<Vector2<f64>>(),
        ..args.template()
    };
    let rule = Arc::new(wave_1d(args.dt, 1.0, 1.0));
    let displacement = args.ic_type().generator(args.domain_size, args.seed);
    let ic = move |position| Vector2::new(displacement(position), 0.0);

    let outcomes = run_chain(&layouts, &template, rule, devices, ic)?;

    log_timing(&outcomes);
    let mut timing_path = args.output_dir.clone();
    timing_path.push("timing.csv");
    args.write_timing_file(&timing_path, &layouts, &outcomes)?;

    let mut csv_path = args.output_dir.clone();
    csv_path.push("wave_1d_classic.csv");
    let mut csv = CsvSink::create(&csv_path)?;
    for o in &outcomes {
        replay(&o.records, &mut csv)?;
    }
    csv.into_inner()?;

    if args.write_image {
        let mut image =
            ImageSink::new(args.domain_size, (-1.0, 1.0), |v: &Vector2<f64>| v[0]);
        for o in &outcomes {
            replay(&o.records, &mut image)?;
        }
        image.write(&output_image_path)?;
    }

    let energy: f64 = gather_global(&outcomes).iter().map(|v| v[1] * v[1]).sum();
    tracing::info!(kinetic = 0.5 * energy, "final state");
    Ok(())
}
