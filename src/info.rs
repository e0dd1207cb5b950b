//! `info` and `test` subcommands: account, catalog and connectivity reports.

use std::fmt::Write as _;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};
use vds_client::{ApiClient, Catalog, Environment, Products, Rois, SessionBuilder, UserInfo};

use crate::cli::InfoArgs;

/// Right edge of the key column in the user table.
const KEY_WIDTH: usize = 26;

/// Width of the api name column in the product table.
const API_NAME_WIDTH: usize = 35;

/// Prints the backend version followed by the sections selected in `args`.
///
/// No section flag means every section.
pub async fn show(api: &ApiClient, args: &InfoArgs) -> Result<()> {
    let status = api
        .backend_status()
        .await
        .context("Failed to read backend status")?;
    println!("backend version: {}", status.backend_version);

    let all = args.all || !(args.user || args.products || args.rois);

    if all || args.user {
        let user = api
            .user_info()
            .await
            .context("Failed to read account details")?;
        print!("{}", render_user(&user));
    }

    if all || args.products || args.rois {
        let catalog = Catalog::fetch(api).await.context("Failed to load catalog")?;
        if all || args.products {
            print!("{}", render_products(&catalog.products));
        }
        if all || args.rois {
            println!("{}", render_rois(&catalog.rois));
        }
    }

    info!(" ================== Finished ==================");
    Ok(())
}

/// Checks the status endpoint of every known deployment, or of the explicit
/// base URL in `builder` when `custom_target` is set.
///
/// Unreachable or refusing deployments are logged, never fatal.
pub async fn test_environments(builder: SessionBuilder, custom_target: bool) -> Result<()> {
    let sessions = if custom_target {
        vec![builder.build()?]
    } else {
        [Environment::Maps, Environment::Staging]
            .into_iter()
            .map(|environment| builder.clone().environment(environment).build())
            .collect::<Result<Vec<_>, _>>()?
    };

    for session in sessions {
        println!("{session}");
        let api = ApiClient::new(session);
        let started = Instant::now();
        match api.backend_status().await {
            Ok(status) => {
                println!("backend version: {}", status.backend_version);
                info!(
                    "API RESPONSE TIME: {:.4} seconds",
                    started.elapsed().as_secs_f64()
                );
            }
            Err(error) => {
                warn!(
                    host = api.session().base(),
                    error = %error,
                    "Not authorized for environment"
                );
            }
        }
        println!();
    }

    info!(" ================== Finished ==================");
    Ok(())
}

fn render_user(user: &UserInfo) -> String {
    let missing = || "-".to_string();
    let rows = [
        ("id", user.id.to_string()),
        ("name", user.name.clone().unwrap_or_else(missing)),
        ("email", user.email.clone().unwrap_or_else(missing)),
        ("roles", user.roles_display()),
        (
            "login_count",
            user.login_count.map_or_else(missing, |n| n.to_string()),
        ),
        (
            "last_login_at",
            user.last_login_at.clone().unwrap_or_else(missing),
        ),
    ];

    let mut out = String::from("\n######################### USER #########################\n\n");
    for (key, value) in rows {
        let _ = writeln!(out, "{key:>KEY_WIDTH$} | {value} ");
    }
    if let Some(extent) = user.area_extent() {
        let _ = writeln!(
            out,
            "\n{:>KEY_WIDTH$} | {} {}",
            "Area extent LON", extent.lon.0, extent.lon.1
        );
        let _ = writeln!(
            out,
            "{:>KEY_WIDTH$} | {} {}",
            "Area extent LAT", extent.lat.0, extent.lat.1
        );
    }
    out
}

fn render_products(products: &Products) -> String {
    let head = "\n ## |             # API name #            |         # Name #        \n";
    let mut out = format!(
        "\n############################ PRODUCTS ############################{head}{}\n",
        "=".repeat(head.len())
    );
    for (i, product) in products.iter().enumerate() {
        let name = product.name.as_deref().unwrap_or(&product.api_name);
        let _ = writeln!(
            out,
            " {i:02} | {:API_NAME_WIDTH$} | {name} ",
            product.api_name
        );
    }
    out
}

fn render_rois(rois: &Rois) -> String {
    let name_width = rois
        .iter()
        .map(|roi| roi.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(10);
    let pad = " ".repeat((name_width - 7) / 2);
    let head = format!(
        "\n # ID / DISPLAY # | {pad}# Name #{pad} |   # Area #   |  # Created at #  |       # Description #     \n"
    );

    let mut out = format!("\n######################### ROIS #########################{head}");
    out.push_str(&"=".repeat(head.len()));
    out.push('\n');

    if rois.is_empty() {
        out.push_str("\tNO ROIS FOUND");
        return out;
    }

    let rows: Vec<String> = rois
        .iter()
        .map(|roi| {
            let shown = if roi.display.unwrap_or(false) { "X" } else { " " };
            let created = roi
                .created()
                .map_or_else(|| "-".repeat(16), |at| at.format("%Y-%m-%d %H:%M").to_string());
            format!(
                " {:7}  /  [{shown}]  | {:name_width$} | {:.3e} ha | {created} | {}",
                roi.id,
                roi.name,
                roi.area / 1e4,
                roi.description.as_deref().unwrap_or(""),
            )
        })
        .collect();
    out.push_str(&rows.join("\n"));
    out
}
