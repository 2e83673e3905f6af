use crate::cli;
use anyhow::{anyhow, Result};
use foxfit_utils::diagnostics::Diagnostics;
use foxfit_utils::foxes::{FoxColumn, FoxTable};
use foxfit_utils::model::{ModelBuilder, NormalPrior};
use foxfit_utils::plot::{self, Figure};
use foxfit_utils::posterior::PosteriorSummary;
use foxfit_utils::sampler::{self, SamplerConfig};
use foxfit_utils::stats::{pearson_r, standardize, ColumnSummary};
use log::{debug, info, warn};
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct PosteriorReport {
    pub parameter: String,
    pub summary: PosteriorSummary,
    pub exact: NormalPrior,
    pub pearson_r: f64,
    pub seed: u64,
    pub config: SamplerConfig,
    pub diagnostics: Diagnostics,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| anyhow!("Could not create {}: {}", path.display(), e))?;
    serde_json::to_writer_pretty(file, value)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

fn log_describe(summary: &[ColumnSummary]) {
    info!(
        "{:>14} {:>6} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
    for s in summary {
        info!(
            "{:>14} {:>6} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.4}",
            s.name, s.count, s.mean, s.std, s.min, s.q25, s.q50, s.q75, s.max
        );
    }
}

/// Load, describe, plot, standardize, fit and plot the posterior. Every
/// artifact lands in `outdir`.
pub fn run(foxes_path: &Path, outdir: &Path, config: &SamplerConfig) -> Result<PosteriorReport> {
    let mut foxes = FoxTable::from_path(foxes_path)?;

    let summary = foxes.describe();
    log_describe(&summary);
    write_json(&outdir.join("describe.json"), &summary)?;

    // groupsize histogram, one bin per integer value
    let groupsize = foxes.values(FoxColumn::Groupsize);
    let (min, max) = foxes.groupsize_range();
    let mut fig = Figure::new(640.0, 420.0);
    let ax = fig.axes_mut();
    let counts = ax.hist(&groupsize, &plot::integer_edges(min as i64, max as i64));
    ax.set_xlabel("groupsize");
    ax.set_ylabel("count");
    debug!("groupsize histogram counts: {:?}", counts);
    fig.save(&outdir.join("groupsize_hist.svg"))?;

    let area = foxes.values(FoxColumn::Area);
    let mut fig = Figure::new(640.0, 420.0);
    let ax = fig.axes_mut();
    ax.scatter(&area, &groupsize);
    ax.set_xlabel("area");
    ax.set_ylabel("groupsize");
    fig.save(&outdir.join("area_groupsize.svg"))?;

    foxes.add_column("std_area", standardize(&area))?;
    foxes.add_column("std_groupsize", standardize(&groupsize))?;
    let std_area = foxes
        .column("std_area")
        .ok_or_else(|| anyhow!("Missing column std_area"))?;
    let std_groupsize = foxes
        .column("std_groupsize")
        .ok_or_else(|| anyhow!("Missing column std_groupsize"))?;

    let r = pearson_r(&std_area, &std_groupsize);
    info!("Pearson's R between standardized area and groupsize: {:.4}", r);
    if !r.is_finite() {
        warn!("Pearson's R is undefined, a column has zero variance");
    }
    let (lo, hi) = std_area
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let x_area = plot::linspace(lo, hi, 100);
    let y_line: Vec<f64> = x_area.iter().map(|x| r * x).collect();
    let mut fig = Figure::new(640.0, 420.0);
    let ax = fig.axes_mut();
    ax.scatter(&std_area, &std_groupsize);
    ax.plot(&x_area, &y_line);
    ax.set_xlabel("standardized area");
    ax.set_ylabel("standardized groupsize");
    fig.save(&outdir.join("std_area_groupsize.svg"))?;

    let model = ModelBuilder::new()
        .prior(NormalPrior::standard())
        .noise_sigma(1.0)
        .predictor(&std_area)
        .observed(&std_groupsize)
        .build()?;
    let trace = sampler::sample(&model, config)?;
    let draws = trace.draws();
    let posterior = PosteriorSummary::from_trace(&trace);
    info!(
        "alpha: mean {:.4}, sd {:.4}, {:.0}% HDI [{:.4}, {:.4}]",
        posterior.mean,
        posterior.sd,
        posterior.hdi_prob * 100.0,
        posterior.hdi_low,
        posterior.hdi_high
    );
    info!(
        "r_hat {:.4}, ess {:.0}, divergences {}",
        trace.diagnostics.r_hat, trace.diagnostics.ess, trace.diagnostics.divergences
    );
    plot::plot_posterior(&draws, "alpha", &posterior)
        .save(&outdir.join("posterior_alpha.svg"))?;

    let report = PosteriorReport {
        parameter: "alpha".to_string(),
        summary: posterior,
        exact: model.conjugate_posterior(),
        pearson_r: r,
        seed: trace.seed,
        config: config.clone(),
        diagnostics: trace.diagnostics,
    };
    write_json(&outdir.join("posterior.json"), &report)?;
    Ok(report)
}

pub fn foxfit(args: &cli::Cli) -> Result<()> {
    let global_timer = Instant::now();
    let config = SamplerConfig {
        method: args.method.into(),
        chains: args.chains,
        draws: args.draws,
        tune: args.tune,
        seed: args.seed,
        ..SamplerConfig::default()
    };
    run(Path::new(&args.foxes), Path::new(&args.out), &config)?;
    info!("Finished in {:?}", global_timer.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use foxfit_utils::sampler::Method;

    #[test]
    fn test_run_writes_all_artifacts() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = SamplerConfig {
            draws: 300,
            tune: 300,
            seed: Some(0),
            ..SamplerConfig::default()
        };
        let report = run(Path::new("test_data/foxes_sample.csv"), dir.path(), &config)
            .expect("Pipeline failed");

        for name in [
            "describe.json",
            "groupsize_hist.svg",
            "area_groupsize.svg",
            "std_area_groupsize.svg",
            "posterior_alpha.svg",
            "posterior.json",
        ] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }
        assert_eq!(report.summary.n_draws, 600);
        assert_eq!(report.seed, 0);

        // sample groupsize spans 2..=3: a single bin
        let hist = std::fs::read_to_string(dir.path().join("groupsize_hist.svg")).unwrap();
        assert_eq!(hist.matches("class=\"bar\"").count(), 1);

        let posterior: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("posterior.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(posterior["parameter"], "alpha");
        assert_eq!(posterior["config"]["method"], "hmc");
    }

    #[test]
    fn test_run_with_metropolis() {
        let dir = tempfile::tempdir().unwrap();
        let config = SamplerConfig {
            method: Method::Metropolis,
            draws: 500,
            tune: 500,
            seed: Some(1),
            ..SamplerConfig::default()
        };
        let report = run(Path::new("test_data/foxes_sample.csv"), dir.path(), &config).unwrap();
        assert!((report.summary.mean - report.exact.mu).abs() < 0.15);
    }

    #[test]
    fn test_run_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = SamplerConfig::default();
        assert!(run(Path::new("test_data/nope.csv"), dir.path(), &config).is_err());
    }
}
