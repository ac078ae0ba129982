use anyhow::Result;

use crate::api_client::{ApiClient, ConnectionResponse, QueryResponse, TupleQuery};
use crate::cli::{OutputFormat, TupleArgs};

// ── Health ──────────────────────────────────────────────────────────────

pub async fn cmd_health(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let health = client.healthz().await?;
    let ready = client.readyz().await?;

    if output == OutputFormat::Json {
        let combined = serde_json::json!({
            "health": health,
            "ready": ready,
        });
        println!("{}", serde_json::to_string_pretty(&combined)?);
        return Ok(());
    }

    let live = if ready.subscription_live { "yes" } else { "no" };
    println!("Health:            {}", health.status);
    println!("Ready:             {}", ready.status);
    println!("Subscription live: {live}");
    Ok(())
}

// ── Conntrack query ─────────────────────────────────────────────────────

pub async fn cmd_query(client: &ApiClient, tuple: &TupleArgs, output: OutputFormat) -> Result<()> {
    let response = client
        .query_connection(&TupleQuery {
            protocol: &tuple.protocol,
            src_ip: &tuple.src_ip,
            dst_ip: &tuple.dst_ip,
            src_port: tuple.src_port,
            dst_port: tuple.dst_port,
        })
        .await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        QueryResponse::Found(conn) => print!("{}", format_connection(&conn)),
        QueryResponse::Error { error } => println!("{error}"),
    }
    Ok(())
}

fn format_connection(conn: &ConnectionResponse) -> String {
    let mut out = format!(
        "{:<10} {:<40} {:<40}\n",
        "DIRECTION", "SOURCE", "DESTINATION"
    );
    for (label, tuple) in [("origin", &conn.origin), ("reply", &conn.reply)] {
        out.push_str(&format!(
            "{label:<10} {:<40} {:<40}\n",
            endpoint(&tuple.src, tuple.src_port),
            endpoint(&tuple.dst, tuple.dst_port),
        ));
    }
    out.push_str(&format!(
        "\nState: {}\n",
        conn.status.as_deref().unwrap_or("-")
    ));
    out
}

fn endpoint(ip: &str, port: u16) -> String {
    if ip.contains(':') {
        format!("[{ip}]:{port}")
    } else {
        format!("{ip}:{port}")
    }
}
