//! Synapse parameters as seen through connection queries

use nestconn::{
    ConnectionFilter, Distribution, KernelConfig, NestError, NodeModel, Projection,
    SimulationContext, SynapseSpec,
};

const N1: usize = 6;
const N2: usize = 6;
const DT: f64 = 0.1;
const THREADS: usize = 2;

fn setup() -> SimulationContext {
    SimulationContext::with_threads(THREADS).unwrap()
}

fn multisynapse(tau: &[f64]) -> NodeModel {
    NodeModel::from_name("iaf_psc_exp_multisynapse")
        .unwrap()
        .with_tau_syn(tau.to_vec())
        .unwrap()
}

/// One-to-one network with `spec`, built through a deferred projection
fn one_to_one(ctx: &mut SimulationContext, spec: SynapseSpec) -> ConnectionFilter {
    let pop1 = ctx.create(NodeModel::IafPscAlpha, N1).unwrap();
    let pop2 = ctx.create(NodeModel::IafPscAlpha, N2).unwrap();
    ctx.connect(Projection::one_to_one(&pop1, &pop2).synapse(spec))
        .unwrap();
    ctx.build_network().unwrap();
    ConnectionFilter::all().source(&pop1).target(&pop2)
}

fn check_synapse(params: &[&str], values: &[f64], model: &str) {
    let mut ctx = setup();
    let mut spec = SynapseSpec::new(model);
    for (name, value) in params.iter().zip(values) {
        spec.set(*name, *value);
    }
    let filter = one_to_one(&mut ctx, spec);
    let conns = ctx.get_connections(&filter);
    assert_eq!(conns.len(), N1);
    for (name, expected) in params.iter().zip(values) {
        let got = conns.get(name).unwrap();
        assert!(
            got.iter().all(|v| (v - expected).abs() < 1e-12),
            "{model}.{name}: expected {expected}, got {got:?}"
        );
    }
}

#[test]
fn weight_setting() {
    check_synapse(&["weight"], &[0.351], "static_synapse");
}

#[test]
fn delay_setting() {
    let mut ctx = setup();
    let d0 = 0.275;
    let filter = one_to_one(&mut ctx, SynapseSpec::default().delay(d0));
    let delays = ctx.get_connections(&filter).delays();
    assert!(delays.windows(2).all(|w| w[0] == w[1]));
    assert!((d0 - delays[0]).abs() < DT);
}

#[test]
fn receptor_port_setting() {
    let mut ctx = setup();
    let model = multisynapse(&[0.5, 0.7]);
    let pop1 = ctx.create(model.clone(), N1).unwrap();
    let pop2 = ctx.create(model, N2).unwrap();
    ctx.connect_immediately(
        Projection::one_to_one(&pop1, &pop2).synapse(SynapseSpec::default().receptor_type(2)),
    )
    .unwrap();
    let ports = ctx
        .get_connections(&ConnectionFilter::all().source(&pop1))
        .receptors();
    assert_eq!(ports, vec![2; N1]);
}

#[test]
fn receptor_port_out_of_range() {
    let mut ctx = setup();
    let model = multisynapse(&[0.5, 0.7]);
    let pop1 = ctx.create(model.clone(), N1).unwrap();
    let pop2 = ctx.create(model, N2).unwrap();
    let err = ctx
        .connect_immediately(
            Projection::one_to_one(&pop1, &pop2).synapse(SynapseSpec::default().receptor_type(3)),
        )
        .unwrap_err();
    assert!(matches!(err, NestError::UnknownReceptor { port: 3, .. }));
    assert_eq!(ctx.connection_count(), 0);
}

#[test]
fn copied_model_setting() {
    let mut ctx = setup();
    ctx.copy_model("static_synapse", "test_syn", &[("receptor_type", 0.0)])
        .unwrap();
    let filter = one_to_one(&mut ctx, SynapseSpec::new("test_syn"));
    let models = ctx.get_connections(&filter).synapse_models();
    assert_eq!(models, vec!["test_syn"; N1]);
}

#[test]
fn default_params() {
    let mut ctx = setup();
    let filter = one_to_one(&mut ctx, SynapseSpec::default());
    let conns = ctx.get_connections(&filter);
    assert!(conns.weights().iter().all(|&w| w == 1.0));
    assert!(conns.delays().iter().all(|&d| d == 1.0));
    assert!(conns.receptors().iter().all(|&r| r == 0));
    assert!(conns.synapse_models().iter().all(|&m| m == "static_synapse"));
}

#[test]
fn autapses_true() {
    let mut ctx = setup();
    let pop = ctx.create(NodeModel::IafPscAlpha, N1).unwrap();
    ctx.connect_immediately(Projection::one_to_one(&pop, &pop).allow_autapses(true))
        .unwrap();
    let m = ctx
        .get_connections(&ConnectionFilter::all())
        .connectivity_matrix(&pop, &pop);
    assert!(m.diag().iter().all(|&v| v == 1.0));
}

#[test]
fn autapses_false() {
    let mut ctx = setup();
    let pop = ctx.create(NodeModel::IafPscAlpha, N1).unwrap();
    ctx.connect_immediately(Projection::one_to_one(&pop, &pop).allow_autapses(false))
        .unwrap();
    let m = ctx
        .get_connections(&ConnectionFilter::all())
        .connectivity_matrix(&pop, &pop);
    assert!(m.diag().iter().all(|&v| v == 0.0));
}

#[test]
fn ht_synapse() {
    check_synapse(&["P", "delta_P"], &[0.987, 0.362], "ht_synapse");
}

#[test]
fn quantal_stp_synapse() {
    check_synapse(
        &["U", "tau_fac", "tau_rec", "u", "a", "n"],
        &[0.679, 8.45, 746.2, 0.498, 10.0, 5.0],
        "quantal_stp_synapse",
    );
}

#[test]
fn stdp_facetshw_synapse_hom() {
    check_synapse(
        &["a_acausal", "a_causal", "a_thresh_th", "a_thresh_tl", "next_readout_time"],
        &[0.162, 0.263, 20.46, 19.83, 0.1],
        "stdp_facetshw_synapse_hom",
    );
}

#[test]
fn stdp_pl_synapse_hom() {
    check_synapse(&["Kplus"], &[0.173], "stdp_pl_synapse_hom");
}

#[test]
fn stdp_synapse_hom() {
    check_synapse(&["Kplus"], &[0.382], "stdp_synapse_hom");
}

#[test]
fn stdp_synapse() {
    check_synapse(
        &["Wmax", "alpha", "lambda", "mu_minus", "mu_plus", "tau_plus"],
        &[98.34, 0.945, 0.02, 0.945, 1.26, 19.73],
        "stdp_synapse",
    );
}

#[test]
fn tsodyks2_synapse() {
    check_synapse(
        &["U", "tau_fac", "tau_rec", "u", "x"],
        &[0.362, 0.152, 789.2, 0.683, 0.945],
        "tsodyks2_synapse",
    );
}

#[test]
fn tsodyks_synapse() {
    check_synapse(
        &["U", "tau_fac", "tau_psc", "tau_rec", "x", "y", "u"],
        &[0.452, 0.263, 2.56, 801.34, 0.567, 0.376, 0.102],
        "tsodyks_synapse",
    );
}

#[test]
fn stdp_dopamine_synapse() {
    let mut ctx = setup();
    let vt = ctx.create_volume_transmitter().unwrap();
    ctx.set_model_default("stdp_dopamine_synapse", "vt", vt as f64)
        .unwrap();
    let spec = SynapseSpec::new("stdp_dopamine_synapse")
        .with("c", 0.153)
        .with("n", 0.365);
    let filter = one_to_one(&mut ctx, spec);
    let conns = ctx.get_connections(&filter);
    assert_eq!(conns.get("c").unwrap(), vec![0.153; N1]);
    assert_eq!(conns.get("n").unwrap(), vec![0.365; N1]);
    assert_eq!(conns.get("vt").unwrap(), vec![vt as f64; N1]);
}

#[test]
fn stdp_dopamine_needs_volume_transmitter() {
    let mut ctx = setup();
    let pop = ctx.create(NodeModel::IafPscAlpha, N1).unwrap();
    let err = ctx
        .connect(Projection::all_to_all(&pop, &pop).synapse(SynapseSpec::new("stdp_dopamine_synapse")))
        .and_then(|_| ctx.build_network())
        .unwrap_err();
    assert!(matches!(err, NestError::MissingDependency { .. }));
}

const ALL_SYNAPSES: [&str; 11] = [
    "cont_delay_synapse",
    "ht_synapse",
    "quantal_stp_synapse",
    "static_synapse_hom_w",
    "stdp_dopamine_synapse",
    "stdp_facetshw_synapse_hom",
    "stdp_pl_synapse_hom",
    "stdp_synapse_hom",
    "stdp_synapse",
    "tsodyks2_synapse",
    "tsodyks_synapse",
];

fn with_volume_transmitter(ctx: &mut SimulationContext, model: &str) {
    if model == "stdp_dopamine_synapse" {
        let vt = ctx.create_volume_transmitter().unwrap();
        ctx.set_model_default(model, "vt", vt as f64).unwrap();
    }
}

#[test]
fn receptor_port_all_synapses() {
    for model in ALL_SYNAPSES {
        let mut ctx = setup();
        with_volume_transmitter(&mut ctx, model);
        let pop1 = ctx.create(multisynapse(&[0.2, 0.5]), N1).unwrap();
        let pop2 = ctx.create(multisynapse(&[0.2, 0.5]), N2).unwrap();
        ctx.connect(Projection::one_to_one(&pop1, &pop2).synapse(SynapseSpec::new(model).receptor_type(1)))
            .unwrap();
        ctx.build_network().unwrap();
        let ports = ctx
            .get_connections(&ConnectionFilter::all().source(&pop1).target(&pop2))
            .receptors();
        assert_eq!(ports, vec![1; N1], "{model}");
    }
}

#[test]
fn weight_all_synapses() {
    for model in ALL_SYNAPSES.iter().filter(|m| **m != "static_synapse_hom_w") {
        let mut ctx = setup();
        with_volume_transmitter(&mut ctx, model);
        let filter = one_to_one(&mut ctx, SynapseSpec::new(*model).weight(0.372));
        assert_eq!(ctx.get_connections(&filter).weights(), vec![0.372; N1], "{model}");
    }
}

#[test]
fn homogeneous_weight_not_settable() {
    let mut ctx = setup();
    let pop = ctx.create(NodeModel::IafPscAlpha, N1).unwrap();
    let err = ctx
        .connect(Projection::one_to_one(&pop, &pop).synapse(SynapseSpec::new("static_synapse_hom_w").weight(0.372)))
        .unwrap_err();
    assert!(matches!(err, NestError::ImmutableParameter { .. }));
    assert!(ctx.pending_projections().is_empty());

    ctx.set_model_default("static_synapse_hom_w", "weight", 0.372)
        .unwrap();
    ctx.connect_immediately(Projection::one_to_one(&pop, &pop).synapse(SynapseSpec::new("static_synapse_hom_w")))
        .unwrap();
    let all = ConnectionFilter::all();
    assert_eq!(ctx.get_connections(&all).weights(), vec![0.372; N1]);
    assert!(matches!(
        ctx.set_connection_status(&all, "weight", 1.0),
        Err(NestError::ImmutableParameter { .. })
    ));
}

#[test]
fn homogeneous_weight_follows_model_default() {
    let mut ctx = setup();
    let pop = ctx.create(NodeModel::IafPscAlpha, 2).unwrap();
    let hom = || Projection::one_to_one(&pop, &pop).synapse(SynapseSpec::new("static_synapse_hom_w"));
    ctx.connect_immediately(hom()).unwrap();
    ctx.set_model_default("static_synapse_hom_w", "weight", 2.0)
        .unwrap();
    ctx.connect_immediately(hom()).unwrap();

    let conns = ctx.get_connections(&ConnectionFilter::all());
    assert_eq!(conns.weights(), vec![2.0; 4]);
    assert_eq!(conns.get("weight").unwrap(), vec![2.0; 4]);
    let reported: Vec<f64> = conns
        .get_status()
        .iter()
        .map(|record| record["weight"].as_f64().unwrap())
        .collect();
    assert_eq!(reported, conns.weights());
}

#[test]
fn delay_all_synapses() {
    for model in ALL_SYNAPSES {
        let mut ctx = setup();
        with_volume_transmitter(&mut ctx, model);
        let filter = one_to_one(&mut ctx, SynapseSpec::new(model).delay(0.4));
        let delays = ctx.get_connections(&filter).delays();
        assert!(delays.iter().all(|d| (d - 0.4).abs() < 1e-9), "{model}: {delays:?}");
    }
}

#[test]
fn continuous_delay_stays_off_grid() {
    let mut ctx = setup();
    let filter = one_to_one(&mut ctx, SynapseSpec::new("cont_delay_synapse").delay(0.275));
    assert_eq!(ctx.get_connections(&filter).delays(), vec![0.275; N1]);
}

#[test]
fn delay_below_resolution_rejected() {
    let mut ctx = setup();
    let pop = ctx.create(NodeModel::IafPscAlpha, N1).unwrap();
    let err = ctx
        .connect_immediately(Projection::one_to_one(&pop, &pop).synapse(SynapseSpec::default().delay(0.01)))
        .unwrap_err();
    assert!(matches!(err, NestError::InvalidParameter(_)));
}

#[test]
fn array_parameters_follow_creation_order() {
    let mut ctx = SimulationContext::with_threads(1).unwrap();
    let weights: Vec<f64> = (0..N1).map(|i| i as f64 * 0.5).collect();
    let delays: Vec<f64> = (1..=N1).map(|i| i as f64).collect();
    let filter = one_to_one(
        &mut ctx,
        SynapseSpec::default()
            .weight(weights.clone())
            .delay(delays.clone()),
    );
    let conns = ctx.get_connections(&filter);
    assert_eq!(conns.weights(), weights);
    assert_eq!(conns.delays(), delays);
}

#[test]
fn array_length_mismatch() {
    let mut ctx = setup();
    let pop = ctx.create(NodeModel::IafPscAlpha, N1).unwrap();
    let res = ctx.connect_immediately(
        Projection::one_to_one(&pop, &pop).synapse(SynapseSpec::default().weight(vec![1.0; N1 - 1])),
    );
    assert!(matches!(
        res,
        Err(NestError::LengthMismatch { expected: N1, .. })
    ));
    assert_eq!(ctx.connection_count(), 0);
}

// ============================================================================
// DISTRIBUTED PARAMETERS
// ============================================================================

/// Kolmogorov-Smirnov statistic of `samples` against `cdf`
fn ks_statistic(mut samples: Vec<f64>, cdf: impl Fn(f64) -> f64) -> f64 {
    samples.sort_by(|a, b| a.total_cmp(b));
    let n = samples.len() as f64;
    samples
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let f = cdf(x);
            (f - i as f64 / n).max((i + 1) as f64 / n - f)
        })
        .fold(0.0, f64::max)
}

/// Asymptotic p-value of the one-sample KS test
fn ks_pvalue(d: f64, n: usize) -> f64 {
    let sqrt_n = (n as f64).sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;
    let sum: f64 = (1..=100)
        .map(|k| {
            let k = k as f64;
            let sign = if k as i64 % 2 == 1 { 1.0 } else { -1.0 };
            sign * (-2.0 * k * k * lambda * lambda).exp()
        })
        .sum();
    (2.0 * sum).clamp(0.0, 1.0)
}

const PVAL: f64 = 0.05;

fn drawn(model: &str, name: &str, dist: Distribution) -> Vec<f64> {
    let mut ctx = SimulationContext::new(KernelConfig {
        threads: THREADS,
        resolution: 1e-4,
        ..KernelConfig::default()
    })
    .unwrap();
    let pop1 = ctx.create(NodeModel::IafPscAlpha, 40).unwrap();
    let pop2 = ctx.create(NodeModel::IafPscAlpha, 25).unwrap();
    ctx.connect_immediately(Projection::all_to_all(&pop1, &pop2).synapse(SynapseSpec::new(model).with(name, dist)))
        .unwrap();
    ctx.get_connections(&ConnectionFilter::all()).get(name).unwrap()
}

#[test]
fn normal_weights_fit_distribution() {
    let samples = drawn(
        "static_synapse",
        "weight",
        Distribution::Normal { mean: 0.5, std: 2.0 },
    );
    assert_eq!(samples.len(), 1000);
    let cdf = |x: f64| 0.5 * (1.0 + libm::erf((x - 0.5) / (2.0 * std::f64::consts::SQRT_2)));
    let n = samples.len();
    let p = ks_pvalue(ks_statistic(samples, cdf), n);
    assert!(p > PVAL, "p = {p}");
}

#[test]
fn uniform_delays_fit_distribution() {
    let samples = drawn(
        "cont_delay_synapse",
        "delay",
        Distribution::Uniform { min: 1.0, max: 3.0 },
    );
    assert!(samples.iter().all(|d| (1.0..3.0).contains(d)));
    let n = samples.len();
    let p = ks_pvalue(ks_statistic(samples, |x| (x - 1.0) / 2.0), n);
    assert!(p > PVAL, "p = {p}");
}

#[test]
fn negative_drawn_delay_fails_whole_call() {
    let mut ctx = setup();
    let pop = ctx.create(NodeModel::IafPscAlpha, 20).unwrap();
    let spec = SynapseSpec::default().delay(Distribution::Normal { mean: 0.0, std: 1.0 });
    let err = ctx
        .connect_immediately(Projection::all_to_all(&pop, &pop).synapse(spec))
        .unwrap_err();
    assert!(matches!(err, NestError::InvalidParameter(_)));
    assert_eq!(ctx.connection_count(), 0);
}
