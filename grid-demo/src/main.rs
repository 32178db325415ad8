use grid_core::{
    desktop, mobile, tablet, AddItemsOptions, BreakpointMap, GridDispatch, GridEvent, GridOptions,
    GridSettings, ItemFilter, LiteGridHandler, MediaQueries, ViewportSize,
};
use grid_layout::{ColumnClasses, Document, DocumentLock, LayoutError, NodeId};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const BREAKPOINTS: &str = r#"{
    "(min-width: 1024px)": { "columns": 4, "columnClasses": "column quarter" },
    "(min-width: 768px) and (max-width: 1023px)": { "columns": 3 }
}"#;

fn build_page() -> Result<(Document, NodeId), LayoutError> {
    let mut doc = Document::new();
    let root = doc.root();

    let gallery = doc.create_element("section");
    doc.set_attribute(gallery, "id", "gallery")?;
    doc.append_child(root, gallery)?;
    for i in 0..10 {
        let card = doc.create_element("article");
        doc.set_class(card, if i % 4 == 3 { "card promo" } else { "card" })?;
        let label = doc.create_text(&format!("card {i}"));
        doc.append_child(card, label)?;
        doc.append_child(gallery, card)?;
    }

    let spare = doc.create_element("article");
    doc.set_class(spare, "card late")?;
    Ok((doc, spare))
}

async fn pump(dispatch: &GridDispatch) {
    let scheduler = dispatch.scheduler();
    while scheduler.pending() > 0 {
        scheduler.wait_for_frame_time_async().await;
        scheduler.run_frame();
    }
}

fn print_gallery(dispatch: &GridDispatch) {
    let doc = dispatch.document().read_doc();
    for id in doc.element_children(doc.root()) {
        tracing::info!("{}", doc.to_html(id));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = GridSettings::from_json(r#"{ "targetFps": 30 }"#)?;
    let (doc, spare) = build_page()?;
    let media = MediaQueries::new(ViewportSize::new(1280.0, 800.0));
    let dispatch = GridDispatch::new(doc.into_shared(), media.clone(), settings);

    let mut events = dispatch.subscribe();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(GridEvent::Destroy { selectors }) => {
                    tracing::info!(?selectors, "grid:destroy");
                    break;
                }
                Ok(event) => tracing::info!(element = ?event.element(), "{}", event.name()),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut breakpoints = BreakpointMap::from_json(BREAKPOINTS)?;
    breakpoints.insert(
        mobile().to_string(),
        GridOptions::new(1)
            .with_column_classes(ColumnClasses::List(vec!["column".into(), "full".into()]))
            .with_filter(ItemFilter::selector(".promo")?),
    );
    tracing::info!(tablet = %tablet(), desktop = %desktop(), "breakpoints loaded");

    dispatch.init("#gallery", breakpoints)?;
    pump(&dispatch).await;
    print_gallery(&dispatch);

    for width in [900.0, 480.0, 1440.0] {
        tracing::info!(width, "resizing viewport");
        media.set_viewport(ViewportSize::new(width, 800.0));
        pump(&dispatch).await;
        print_gallery(&dispatch);
    }

    let added = dispatch.add_items("#gallery", spare, AddItemsOptions::prepend())?;
    pump(&dispatch).await;
    let grids = added.await?;
    tracing::info!(grids, "late card added");

    tracing::info!(ready = ?dispatch.ready(), "tearing down");
    let destroyed = dispatch.destroy(&[]);
    pump(&dispatch).await;
    let selectors = destroyed.await?;
    tracing::info!(?selectors, "destroyed");
    print_gallery(&dispatch);

    listener.await?;

    if let Some(lite) = LiteGridHandler::init(dispatch.context(), "#gallery", GridOptions::new(2))? {
        pump(&dispatch).await;
        tracing::info!(columns = ?lite.grid().columns(), "lite grid set up");
        print_gallery(&dispatch);

        let restored = lite.destroy();
        pump(&dispatch).await;
        let restored = restored.await?;
        tracing::info!(restored, "lite grid destroyed");
    }
    Ok(())
}
