use anyhow::{Context, Result};
use conduit_core::{config::AppConfig, orchestrator::HealthStatus, runtime::ConduitRuntime};
use prettytable::{row, Table};

use super::utils::{print_info, status_label};

pub async fn handle_health_command(config: AppConfig, json: bool) -> Result<()> {
    let runtime = ConduitRuntime::builder()
        .with_config(config)
        .build()
        .context("failed to build runtime")?;

    if !json {
        print_info(&format!(
            "Probing {} providers...",
            runtime.config().provider_count()
        ));
    }
    runtime.health_monitor().check_now().await;
    let status = runtime.request_manager().get_health_status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_table(&status);
    }

    runtime.shutdown().await;
    Ok(())
}

fn print_table(status: &HealthStatus) {
    let mut table = Table::new();
    table.add_row(row![
        "Chain",
        "Provider",
        "Tier",
        "Weight",
        "Status",
        "Errors",
        "Avg Latency",
        "Last Checked"
    ]);

    for network in &status.networks {
        for provider in &network.providers {
            table.add_row(row![
                format!("{} ({})", network.chain_id, network.name),
                provider.name,
                provider.tier.as_str(),
                provider.weight,
                status_label(provider.is_healthy),
                provider.error_count,
                format!("{:.1}ms", provider.avg_latency_ms),
                provider
                    .last_checked_at
                    .map_or("Never".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            ]);
        }
    }

    table.printstd();
    println!(
        "{}/{} providers healthy",
        status.healthy_providers(),
        status.total_providers()
    );
}
