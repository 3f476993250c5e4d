use sphinxlink::{Config, FieldType, Registry, Result, RowShape, SphinxLink};

pub async fn main() -> Result<()> {
    // will read the `SPHINX_*` environment variables
    let config = Config::from_env()?;
    let link = SphinxLink::with_registry(Registry::new().defaults(config.clone()))
        .encoding(sphinxlink::Encoding::from_env()?);

    // credentials from `SPHINX_USER`, `SPHINX_PASS` and `SPHINX_DATABASE`
    link.connect_with("main", config.clone()).await?;
    link.connect_with("backup", config.clone()).await?;

    for info in link.connections().await {
        tracing::info!(name = %info.name, host = %info.host, port = info.port, "connection");
    }

    let shape = RowShape::from([FieldType::Text, FieldType::Text]);
    let tables = link.query("main", "SHOW TABLES").fetch_all(&shape).await?;
    tracing::info!(tables = tables.len(), "listed");

    for meta in link.meta("main").await?.collect().await? {
        tracing::info!(%meta, "meta");
    }

    // implicit connection, named after the host
    let status = link
        .query_at(config.host(), config.port(), "SHOW STATUS")
        .fetch_all(&shape)
        .await?;
    assert!(!status.is_empty());
    assert_eq!(link.connections().await.len(), 3);

    link.disconnect("main").await?;
    link.disconnect("backup").await?;
    link.disconnect(config.host()).await?;

    link.disconnect("main").await.unwrap_err();

    Ok(())
}
