use crate::cli::ConfigArgs;
use crate::commands::{fail, load_config};
use crate::exit_codes;
use crate::output;
use eegnet_prep::{FirBandpass, PipelineConfig};
use serde::Serialize;

#[derive(Serialize)]
struct ConfigOutput<'a> {
    pipeline: &'a PipelineConfig,
    fingerprint: String,
    window_samples: usize,
    filter_taps: usize,
}

pub fn execute(args: ConfigArgs) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let filter = match FirBandpass::from_config(&config) {
        Ok(f) => f,
        Err(e) => return fail(e),
    };

    if let Some(ref path) = args.write {
        if let Err(e) = config.write_to(path) {
            return fail(e);
        }
        eprintln!("Wrote pipeline configuration to {}", path);
    }

    let result = ConfigOutput {
        pipeline: &config,
        fingerprint: config.fingerprint(),
        window_samples: config.window_samples(),
        filter_taps: filter.len(),
    };

    if args.json {
        return output::print_json(&result);
    }

    println!("Pipeline configuration ({})", result.fingerprint);
    println!("  Band-pass:    {} - {} Hz ({} taps)", config.l_freq, config.h_freq, result.filter_taps);
    println!(
        "  Window:       {} .. {} s at {} Hz ({} samples)",
        config.tmin, config.tmax, config.sampling_rate, result.window_samples
    );
    println!("  Model input:  {} channels × {} samples", config.chans, config.samples);
    println!("  Unit scale:   {}", config.unit_scale);
    let events: Vec<String> = config
        .event_id
        .iter()
        .map(|(code, index)| format!("{}→{}", code, index))
        .collect();
    println!("  Events:       {}", events.join(", "));
    if !config.channels.is_empty() {
        println!("  Channels:     {}", config.channels.join(", "));
    }
    if !config.bad_channels.is_empty() {
        println!("  Bad channels: {}", config.bad_channels.join(", "));
    }
    exit_codes::SUCCESS
}
