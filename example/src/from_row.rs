#![allow(unused)]
use serde::Deserialize;
use sphinxlink::{Connection, FieldType, FromRow, Json, Result, RowShape, query};
use time::UtcDateTime;

#[derive(Debug, Deserialize)]
struct Attrs {
    legs: u32,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, FromRow)]
struct Product {
    id: i64,
    title: String,
    #[sql(rename = "attrs")]
    meta: Json<Attrs>,
    created: UtcDateTime,
}

#[derive(FromRow)]
struct ProductTuple(i64, String);

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;
    let none = RowShape::default();

    query("DROP TABLE IF EXISTS product", &mut conn).fetch_all(&none).await?;
    query("CREATE TABLE product(title text, attrs json, created timestamp)", &mut conn)
        .fetch_all(&none)
        .await?;
    query(
        r#"INSERT INTO product(id, title, attrs, created) VALUES (1, 'Chair', '{"legs":4}', 1700000000)"#,
        &mut conn,
    )
    .fetch_all(&none)
    .await?;

    let shape = RowShape::from([FieldType::BigInt, FieldType::Text, FieldType::Json, FieldType::Timestamp]);
    let products = query("SELECT id, title, attrs, created FROM product", &mut conn)
        .fetch::<Product>(&shape)
        .await?;

    assert_eq!(products[0].meta.0.legs, 4);
    assert_eq!(products[0].meta.0.color, None);

    let raw = query("SELECT attrs FROM product", &mut conn)
        .fetch::<(Json<serde_json::Value>,)>(&RowShape::from([FieldType::Json]))
        .await?;
    assert_eq!(raw[0].0.0["legs"], 4);
    assert_eq!(products[0].created.year(), 2023);

    let products = query("SELECT id, title FROM product", &mut conn)
        .fetch::<ProductTuple>(&RowShape::from([FieldType::BigInt, FieldType::Text]))
        .await?;

    assert_eq!(products[0].1, "Chair");

    query("DROP TABLE product", &mut conn).fetch_all(&none).await?;

    Ok(())
}
