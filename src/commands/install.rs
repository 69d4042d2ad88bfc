use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use provision::{AutoConfirm, ConfirmCallback};

use crate::Context;
use crate::bundle::DirectoryBundles;
use crate::cli::InstallArgs;
use crate::config::InstallerConfig;
use crate::installer::{InstallRequest, Installer};
use crate::progress::{StageBar, result_line};
use crate::report::InstallationReport;
use crate::ui;
use wsclient::WorkspaceClient;

/// Asks on the terminal
struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read confirmation")
    }
}

fn request(args: &InstallArgs) -> InstallRequest {
    InstallRequest {
        bundle: args.name.clone(),
        path: args.path.clone(),
        catalog: args.catalog.clone(),
        schema: args.schema.clone(),
        warehouse: args.warehouse.clone(),
        overwrite: args.overwrite,
        serverless: args.serverless,
        skip_dashboards: args.skip_dashboards,
        skip_query_rooms: args.skip_genie_rooms,
        only: args.only.clone(),
        dry_run: args.dry_run,
        jobs: args.jobs.map(usize::from),
    }
}

pub fn run(ctx: &Context, args: InstallArgs) -> Result<()> {
    let mut config = InstallerConfig::load()?;
    if let Some(host) = &args.workspace.host {
        config.host = Some(host.clone());
    }
    if let Some(token) = &args.workspace.token {
        config.token = Some(token.clone());
    }
    let host = config
        .host
        .clone()
        .context("No workspace host: pass --host, set LAKEBUNDLE_HOST or add `host` to config.toml")?;
    let token = config
        .token
        .clone()
        .context("No access token: pass --token, set LAKEBUNDLE_TOKEN or add `token` to config.toml")?;

    let client = WorkspaceClient::http(&host, &token, config.request_timeout())
        .with_retry(config.retry.policy());
    let bundles = DirectoryBundles::new(config.bundles_path()?);
    let installer = Installer::new(client, &bundles, &config);
    let request = request(&args);

    if !ctx.quiet && !args.json {
        ui::header(&format!("Installing {}", request.bundle));
        if request.dry_run {
            ui::info("Dry run: nothing will be created or changed");
        }
    }

    let mut progress = StageBar::new(ctx.quiet || args.json);
    let report = if args.yes {
        installer.install(&request, &mut progress, &mut AutoConfirm)?
    } else {
        installer.install(&request, &mut progress, &mut PromptConfirm)?
    };

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print_report(ctx, &report);
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} finished with {} failed resource(s) and {} failed document(s)",
            report.bundle,
            report.summary.failed,
            report.failed_documents().count()
        );
    }
    Ok(())
}

fn print_report(ctx: &Context, report: &InstallationReport) {
    if ctx.quiet {
        return;
    }

    ui::section("Summary");
    ui::kv("Folder", &report.folder);
    ui::kv("Location", &format!("{}.{}", report.catalog, report.schema));
    let summary = &report.summary;
    ui::kv(
        "Resources",
        &format!(
            "{} created, {} updated, {} reused, {} skipped, {} failed",
            summary.created, summary.updated, summary.reused, summary.skipped, summary.failed
        ),
    );
    if summary.fallback > 0 {
        ui::kv("Fallback", &summary.fallback.to_string());
    }

    if ctx.verbose > 0 {
        for (kind, results) in report.by_kind() {
            ui::section(&kind.to_string());
            for result in results {
                println!("{}", result_line(result));
                for (key, value) in &result.metadata {
                    ui::dim(&format!("  {key}: {value}"));
                }
            }
        }
    }

    if !report.documents.is_empty() {
        let uploaded = report.documents.iter().filter(|d| d.uploaded).count();
        let annotated: usize = report.documents.iter().map(|d| d.rewrite.annotated).sum();
        ui::kv(
            "Documents",
            &format!("{uploaded}/{} uploaded, {annotated} link(s) annotated", report.documents.len()),
        );
    }

    for failure in report.failures() {
        ui::error(&format!(
            "{} {}: {}",
            failure.kind,
            failure.logical_id.bold(),
            failure.error_message().unwrap_or("failed")
        ));
    }
    for document in report.failed_documents() {
        ui::error(&format!(
            "{}: {}",
            document.path,
            document.error.as_deref().unwrap_or("not uploaded")
        ));
    }
    for warning in &report.warnings {
        ui::warn(warning);
    }

    if report.is_success() && !report.dry_run {
        ui::success(&format!("{} installed in {}", report.bundle, report.folder));
    }
}
