//! Content upload
//!
//! Notebooks get their resource links rewritten and the build catalog
//! replaced before they are imported; directories and plain files are
//! imported byte for byte. Uploads run on a bounded pool, parent folders
//! are created once through the install context.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use notebook::{LinkTable, Rewrite, rewrite_bytes};
use rayon::prelude::*;
use serde_json::json;

use crate::bundle::{BundleSource, TEMPLATES_DIR};
use crate::context::InstallContext;
use crate::descriptor::{BundleDescriptor, ObjectKind};
use crate::report::DocumentReport;
use crate::template::SchemaRewrite;

/// Shared documents added to every installation, under `_resources/`
pub const TEMPLATE_DOCUMENTS: [&str; 3] = ["LICENSE", "NOTICE", "README"];
pub const RESOURCES_DIR: &str = "_resources";

/// One document to import
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    /// Path inside the bundle
    pub source: String,
    /// Workspace path
    pub target: String,
    pub kind: ObjectKind,
    pub bytes: Result<Vec<u8>, String>,
}

/// Everything to upload for a bundle: template documents, then the
/// descriptor's notebooks in order
pub fn plan(
    ctx: &InstallContext,
    bundles: &dyn BundleSource,
    descriptor: &BundleDescriptor,
) -> Vec<Upload> {
    let folder = &ctx.settings.bundle_folder;
    let mut uploads = Vec::new();

    for name in TEMPLATE_DOCUMENTS {
        let file = format!("{name}.ipynb");
        let bytes = match bundles.template(&file) {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => continue,
            Err(err) => Err(format!("{err:#}")),
        };
        uploads.push(Upload {
            source: format!("{TEMPLATES_DIR}/{file}"),
            target: format!("{folder}/{RESOURCES_DIR}/{name}"),
            kind: ObjectKind::Notebook,
            bytes,
        });
    }

    for notebook in &descriptor.notebooks {
        let clean = notebook.clean_path();
        let source = notebook.object_type.source_path(&clean);
        let bytes = bundles
            .read(&descriptor.name, &source)
            .map_err(|e| format!("{e:#}"));
        uploads.push(Upload {
            target: notebook.object_type.target_path(folder, &clean),
            source,
            kind: notebook.object_type,
            bytes,
        });
    }
    uploads
}

fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|p| !p.is_empty())
}

/// Rewrite (notebooks only) and import one document
pub fn upload(
    ctx: &InstallContext,
    item: &Upload,
    links: &LinkTable,
    schema: &SchemaRewrite,
) -> DocumentReport {
    let failed = |error: String| DocumentReport::failed(&item.source, &item.target, error);
    let bytes = match &item.bytes {
        Ok(bytes) => bytes.clone(),
        Err(err) => return failed(err.clone()),
    };

    let (content, mut rewrite) = match item.kind {
        ObjectKind::Notebook => match rewrite_bytes(&item.source, bytes, links) {
            Ok(rewrite) => (schema.apply(&rewrite.content).into_bytes(), rewrite),
            Err(err) => return failed(err.to_string()),
        },
        ObjectKind::Directory | ObjectKind::File => (bytes, Rewrite::default()),
    };
    rewrite.content.clear();

    if let Some(parent) = parent(&item.target)
        && let Err(err) = ctx.ensure_folder(parent)
    {
        return failed(err.to_string());
    }

    let body = json!({
        "path": item.target,
        "content": STANDARD.encode(&content),
        "format": item.kind.import_format(),
        "overwrite": true,
    });
    match ctx.client.post("2.0/workspace/import", &body) {
        Ok(response) if !response.is_error() => {
            log::debug!("Uploaded {}", item.target);
            DocumentReport::uploaded(&item.source, &item.target, rewrite)
        }
        Ok(response) => failed(format!("import rejected: {}", response.message())),
        Err(err) => failed(err.to_string()),
    }
}

/// Upload everything on at most `jobs` workers. Reports keep the order of
/// `uploads`.
pub fn upload_all(
    ctx: &InstallContext,
    uploads: &[Upload],
    links: &LinkTable,
    schema: &SchemaRewrite,
    jobs: usize,
) -> Vec<DocumentReport> {
    let sequential = || {
        uploads
            .iter()
            .map(|item| upload(ctx, item, links, schema))
            .collect()
    };
    if jobs <= 1 || uploads.len() <= 1 {
        return sequential();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool.install(|| {
            uploads
                .par_iter()
                .map(|item| upload(ctx, item, links, schema))
                .collect()
        }),
        Err(err) => {
            log::warn!("Failed to create thread pool, uploading sequentially: {err}");
            sequential()
        }
    }
}
