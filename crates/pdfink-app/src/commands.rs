//! Command implementations on top of an [`EditorSession`].

use crate::cli::{Cli, Command, ObjectRef, default_output};
use anyhow::{Context, Result, bail};
use kurbo::Vec2;
use pdfink_client::{ClientConfig, HttpBackend};
use pdfink_core::{EditorSession, MemorySurfaceFactory, NoPreview, OverlayError, ShapeHandle};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

type Session = EditorSession<HttpBackend, NoPreview, MemorySurfaceFactory>;

/// Collected rollback causes.
type Reports = Rc<RefCell<Vec<String>>>;

fn client_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("Invalid backend configuration")?;
    if let Some(url) = &cli.backend {
        let timeout = config.timeout_secs;
        config = ClientConfig::new(url).with_context(|| format!("Invalid backend URL {}", url))?;
        config.timeout_secs = timeout;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    Ok(config)
}

async fn open_session(cli: &Cli, file: &Path) -> Result<(Session, Reports)> {
    let config = client_config(cli)?;
    log::info!("Using backend {}", config.base_url);
    let backend = HttpBackend::new(config).context("Failed to build HTTP client")?;

    let reports: Reports = Rc::new(RefCell::new(Vec::new()));
    let sink_reports = reports.clone();
    let session = EditorSession::new(backend, NoPreview, MemorySurfaceFactory::new())
        .with_error_sink(move |e: &OverlayError| {
            log::error!("{}", e);
            sink_reports.borrow_mut().push(e.to_string());
        });

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    session
        .load(bytes)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    Ok((session, reports))
}

fn find_shape(session: &Session, object: &ObjectRef) -> Result<ShapeHandle> {
    session.with_overlay(|overlay| {
        let page = overlay
            .page(object.page)
            .with_context(|| format!("Document has no page {}", object.page))?;
        page.controller_by_id(&object.id)
            .map(|c| c.shape())
            .with_context(|| format!("No editable object {} on page {}", object.id, object.page))
    })
}

async fn save(session: &Session, input: &Path, out: Option<&Path>) -> Result<()> {
    let bytes = session.download().await.context("Failed to download document")?;
    let out = out.map(Path::to_path_buf).unwrap_or_else(|| default_output(input));
    tokio::fs::write(&out, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Wrote {} ({} bytes)", out.display(), bytes.len());
    Ok(())
}

fn ensure_no_rollback(reports: &Reports) -> Result<()> {
    if let Some(reason) = reports.borrow().first() {
        bail!("Edit was rolled back: {}", reason);
    }
    Ok(())
}

async fn inspect(cli: &Cli, file: &Path) -> Result<()> {
    let (session, _) = open_session(cli, file).await?;
    let doc_id = session.doc_id().unwrap_or_default();
    println!("Document {}", doc_id);
    session.with_overlay(|overlay| {
        for page in overlay.pages() {
            let size = page.page_size_px();
            println!(
                "Page {} ({:.0}x{:.0}px, {} editable)",
                page.page_index(),
                size.width,
                size.height,
                page.controllers().count()
            );
            for c in page.controllers() {
                let [a, b, cc, d, e, f] = c.baseline().as_coeffs();
                println!(
                    "  {:<5} {:<24} [{:.3} {:.3} {:.3} {:.3} {:.2} {:.2}] {:.1}x{:.1}px",
                    c.kind().as_str(),
                    c.id(),
                    a,
                    b,
                    cc,
                    d,
                    e,
                    f,
                    c.size_px().width,
                    c.size_px().height
                );
            }
        }
    });
    Ok(())
}

async fn move_object(
    cli: &Cli,
    file: &Path,
    object: &ObjectRef,
    by: Vec2,
    out: Option<&Path>,
) -> Result<()> {
    let (session, reports) = open_session(cli, file).await?;
    let shape = find_shape(&session, object)?;

    session.with_overlay_mut(|overlay| -> Result<()> {
        overlay.interaction_started(object.page, shape)?;
        let page = overlay
            .page_mut(object.page)
            .with_context(|| format!("Document has no page {}", object.page))?;
        page.surface_mut().drag(shape, by);
        Ok(())
    })?;
    session.finish_interaction(object.page, shape).await?;
    ensure_no_rollback(&reports)?;

    save(&session, file, out).await
}

async fn replace_text(
    cli: &Cli,
    file: &Path,
    object: &ObjectRef,
    text: &str,
    out: Option<&Path>,
) -> Result<()> {
    let (session, reports) = open_session(cli, file).await?;
    find_shape(&session, object)?;

    if !session.replace_text(object.page, &object.id, text).await {
        ensure_no_rollback(&reports)?;
        bail!("Text replacement failed");
    }
    save(&session, file, out).await
}

/// Run the parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Inspect { file } => inspect(&cli, file).await,
        Command::Move { file, object, by, out } => {
            move_object(&cli, file, object, *by, out.as_deref()).await
        }
        Command::ReplaceText { file, object, text, out } => {
            replace_text(&cli, file, object, text, out.as_deref()).await
        }
    }
}
