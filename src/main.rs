use pcsr_bench::{
    backend::{self, BackendParams},
    config::RunConfig,
    orchestrator::{self, PhaseReport},
    workload::Workload,
};
use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config = RunConfig::from_args(std::env::args().skip(1))?;
    info!(
        core_graph = %config.core_graph.display(),
        update_file = %config.update_file.display(),
        threads = config.threads,
        variant = %config.variant,
        search = ?config.search,
        "resolved run configuration"
    );

    let workload = Workload::load(&config)?;
    println!("Core graph size: {}", workload.core.len());

    let params = BackendParams::from_config(&config, workload.node_capacity());
    let mut backend = backend::build(config.variant, params);
    let report = orchestrator::execute(backend.as_mut(), &workload, config.threads)?;

    print_phase("core", &report.core);
    print_phase("updates", &report.updates);
    println!(
        "Node bound: {} Final edges: {}",
        report.node_bound, report.final_edge_count
    );
    info!(
        node_bound = report.node_bound,
        final_edges = report.final_edge_count,
        "benchmark finished"
    );
    Ok(())
}

fn print_phase(label: &str, phase: &PhaseReport) {
    let elapsed_ms = phase.elapsed.as_secs_f64() * 1_000.0;
    let throughput = if elapsed_ms > 0.0 {
        phase.submitted as f64 / (elapsed_ms / 1_000.0)
    } else {
        0.0
    };
    println!(
        "{label} ops={} elapsed={elapsed_ms:.4}ms throughput={throughput:.0}/s applied={} redundant={} rejected={} remote={}",
        phase.submitted,
        phase.drain.applied(),
        phase.drain.redundant,
        phase.drain.rejected,
        phase.drain.remote
    );
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pcsr_bench=info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
