use hetstep::classic_example::*;
use hetstep::driver::*;
use hetstep::output::*;
use hetstep::stencil::standard_stencils::heat_1d;
use std::sync::Arc;

fn main() -> hetstep::Result<()> {
    let (args, output_image_path) = Args::cli_parse("heat_1d_classic")?;

    #[cfg(feature = "profile-with-puffin")]
    let _puffin_server = start_profiler()?;

    let (layouts, devices) = args.decomposition()?;
    let rule = Arc::new(heat_1d(args.dt, 1.0, 1.0));
    let ic = args.ic_type().generator(args.domain_size, args.seed);

    let outcomes = run_chain(&layouts, &args.template(), rule, devices, ic)?;

    log_timing(&outcomes);
    let mut timing_path = args.output_dir.clone();
    timing_path.push("timing.csv");
    args.write_timing_file(&timing_path, &layouts, &outcomes)?;

    let mut csv_path = args.output_dir.clone();
    csv_path.push("heat_1d_classic.csv");
    let mut csv = CsvSink::create(&csv_path)?;
    for o in &outcomes {
        replay(&o.records, &mut csv)?;
    }
    csv.into_inner()?;

    if args.write_image {
        let mut image = ImageSink::new(args.domain_size, (0.0, 1.0), |v: &f64| *v);
        for o in &outcomes {
            replay(&o.records, &mut image)?;
        }
        image.write(&output_image_path)?;
    }

    Ok(())
}
