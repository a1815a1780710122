//! Prometheus text exposition for `/metrics`.

use gpumesh_dispatch::StatsSnapshot;

/// Membership gauges sampled at scrape time.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerGauges {
    pub registered: usize,
    pub active: usize,
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} counter\n"));
    out.push_str(&format!("{name} {value}\n"));
}

fn gauge(out: &mut String, name: &str, help: &str, value: usize) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    out.push_str(&format!("{name} {value}\n"));
}

pub fn render_prometheus(stats: &StatsSnapshot, workers: WorkerGauges) -> String {
    let mut out = String::new();

    gauge(
        &mut out,
        "gpumesh_workers_registered",
        "Worker records currently stored, stale ones included.",
        workers.registered,
    );
    gauge(
        &mut out,
        "gpumesh_workers_active",
        "Workers with a heartbeat younger than the timeout.",
        workers.active,
    );

    counter(&mut out, "gpumesh_dispatch_requests_total", "Inference requests received.", stats.requests);
    counter(&mut out, "gpumesh_dispatch_success_total", "Requests answered by a worker.", stats.successes);
    counter(&mut out, "gpumesh_dispatch_failures_total", "Requests that ended in an error.", stats.failures);
    counter(&mut out, "gpumesh_dispatch_retries_total", "Reselect-and-retry cycles started.", stats.retries);
    counter(
        &mut out,
        "gpumesh_dispatch_no_worker_total",
        "Requests rejected because no worker qualified.",
        stats.no_worker,
    );
    counter(
        &mut out,
        "gpumesh_dispatch_selection_timeouts_total",
        "Worker selections that exceeded the selection timeout.",
        stats.selection_timeouts,
    );
    counter(
        &mut out,
        "gpumesh_dispatch_forward_timeouts_total",
        "Requests that failed on a worker timeout.",
        stats.forward_timeouts,
    );

    out
}
