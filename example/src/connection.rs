use std::env::var;
use sphinxlink::{query, Config, Connection, Result, RowShape};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect(&var("SPHINX_URL").unwrap()).await?;
    query("SHOW STATUS", &mut conn).fetch_all(&RowShape::text(2)).await?;
    conn.close().await?;

    let mut conn = Connection::connect_env().await?;
    tracing::info!(version = conn.server().version(), "connected");
    conn.ping().await?;
    conn.close().await?;

    let config = Config::from_env()?.reconnect(false);
    let mut conn = Connection::connect_with(config).await?;
    query("SHOW TABLES", &mut conn).fetch_all(&RowShape::text(2)).await?;
    conn.close().await?;

    Ok(())
}
