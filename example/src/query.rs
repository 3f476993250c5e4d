use std::sync::{Arc, atomic::AtomicBool};
use sphinxlink::{Connection, ErrorKind, FieldType, Result, RowShape, query};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;
    let none = RowShape::default();

    // Execute

    query("DROP TABLE IF EXISTS sphinxlink", &mut conn).fetch_all(&none).await?;
    query("CREATE TABLE sphinxlink(title text, price float)", &mut conn).fetch_all(&none).await?;
    query(
        "INSERT INTO sphinxlink(id, title, price) VALUES \
            (1, 'Deez nuts', 4.5), (2, 'Foo bar', 2), (3, 'It\\'s foo', 1)",
        &mut conn,
    )
    .fetch_all(&none)
    .await?;

    // Queries

    let shape = RowShape::from([FieldType::BigInt, FieldType::Text, FieldType::Float]);
    let set = query("SELECT id, title, price FROM sphinxlink WHERE MATCH(?)", &mut conn)
        .matching("foo")
        .fetch_all(&shape)
        .await?;

    assert_eq!(set.len(), 2);
    assert_eq!(set.columns(), ["id", "title", "price"]);

    for row in &set {
        let title = row.try_get::<_, String>("title").unwrap();
        tracing::info!(%title, "found");
    }

    let datas = query("SELECT id, price FROM sphinxlink ORDER BY id ASC", &mut conn)
        .fetch::<(i64, f64)>(&RowShape::from([FieldType::BigInt, FieldType::Float]))
        .await?;

    assert_eq!(datas[0], (1, 4.5));

    // untrusted text is escaped
    let set = query("SELECT id FROM sphinxlink WHERE MATCH(?)", &mut conn)
        .matching("it's")
        .fetch_all(&RowShape::text(1))
        .await?;

    assert_eq!(set.len(), 1);

    // Cancellation

    let stop = Arc::new(AtomicBool::new(true));
    let err = query("SELECT * FROM sphinxlink", &mut conn)
        .interrupt(stop.clone())
        .fetch_all(&RowShape::text(3))
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::Interrupted(_)));

    // Error case

    let err = query("SELECT id FROM sphinxlink", &mut conn)
        .fetch_all(&RowShape::text(5))
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::ShapeMismatch(_)));

    let err = query("SELEC foo", &mut conn).fetch_all(&none).await.unwrap_err();
    tracing::info!(error = %err, "expected");
    assert!(err.server_error().is_some());

    query("DROP TABLE sphinxlink", &mut conn).fetch_all(&none).await?;

    Ok(())
}
