//! End-to-end: simulate seeded events and fit them.

use detector_sim::{Scenario, ScenarioKind};
use track_fit::{IterativeFitConfig, Track, TrackQuality};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Summary {
    good: usize,
    mean_chi_sq_per_ndf: f64,
    mean_rel_momentum_error: f64,
}

fn fit_scenario(scenario: &Scenario) -> (Vec<Track>, Summary) {
    let fitter = scenario.fitter(IterativeFitConfig::default());
    let sims = scenario.simulate();
    assert!(sims.len() >= scenario.n_tracks * 9 / 10);

    let mut tracks: Vec<Track> = sims.iter().map(|s| s.to_track()).collect();
    let results = fitter.fit_all(&mut tracks);

    let mut good = 0;
    let mut chi = 0.0;
    let mut dp = 0.0;
    for ((sim, track), result) in sims.iter().zip(&tracks).zip(&results) {
        if result.is_err() || track.quality() != TrackQuality::Good {
            continue;
        }
        good += 1;
        chi += track.chi_sq_per_ndf();
        let truth = sim.truth_at_layers[0];
        assert_eq!(track.first().z, truth.z);
        dp += (track.first().qp() - truth.qp()).abs() / truth.qp().abs();
    }
    let n = good.max(1) as f64;
    let summary = Summary {
        good,
        mean_chi_sq_per_ndf: chi / n,
        mean_rel_momentum_error: dp / n,
    };
    (tracks, summary)
}

#[test]
fn pixel_telescope_fits_are_consistent() {
    init_logging();
    let scenario = Scenario::build(ScenarioKind::PixelTelescope, 11);
    let (tracks, summary) = fit_scenario(&scenario);

    assert!(summary.good >= 95, "good fits: {}", summary.good);
    assert!(
        summary.mean_chi_sq_per_ndf > 0.5 && summary.mean_chi_sq_per_ndf < 2.0,
        "mean chi2/ndf = {}",
        summary.mean_chi_sq_per_ndf
    );
    // Six pixel hits: 12 measurements, 5 parameters.
    assert!(tracks
        .iter()
        .filter(|t| t.hits().len() == 6)
        .all(|t| t.ndf() == 7));
}

#[test]
fn strip_tracker_measures_momentum() {
    init_logging();
    let scenario = Scenario::build(ScenarioKind::StripTracker, 23);
    let (_, summary) = fit_scenario(&scenario);

    assert!(summary.good >= 95, "good fits: {}", summary.good);
    assert!(
        summary.mean_chi_sq_per_ndf > 0.5 && summary.mean_chi_sq_per_ndf < 2.0,
        "mean chi2/ndf = {}",
        summary.mean_chi_sq_per_ndf
    );
    // Seeds are smeared by 10 %; the fit has to do clearly better.
    assert!(
        summary.mean_rel_momentum_error < 0.06,
        "mean |dp/p| = {}",
        summary.mean_rel_momentum_error
    );
}

#[test]
fn parallel_and_sequential_fits_agree() {
    let scenario = Scenario {
        n_tracks: 10,
        ..Scenario::build(ScenarioKind::StripTracker, 5)
    };
    let fitter = scenario.fitter(IterativeFitConfig::default());
    let sims = scenario.simulate();

    let mut parallel: Vec<Track> = sims.iter().map(|s| s.to_track()).collect();
    fitter.fit_all(&mut parallel);
    for (sim, fitted) in sims.iter().zip(&parallel) {
        let mut track = sim.to_track();
        let _ = fitter.fit(&mut track);
        assert_eq!(track.first(), fitted.first());
        assert_eq!(track.chi_sq(), fitted.chi_sq());
        assert_eq!(track.quality(), fitted.quality());
    }
}
