//! Non-ASCII text and binary values through the read path.

mod common;

use common::{caller, gateway, seed, table_rows};
use sql_gateway_mcp::tools::query::{SampleDataInput, SelectQueryInput};
use sql_gateway_mcp::tools::schema::DescribeTableInput;
use unicode_width::UnicodeWidthStr;

fn select(sql: &str) -> SelectQueryInput {
    SelectQueryInput {
        sql: sql.to_string(),
    }
}

#[tokio::test]
async fn test_chinese_text_round_trips() {
    let gw = gateway().await;
    seed(
        &gw,
        &[
            "CREATE TABLE utf8_test (id INTEGER PRIMARY KEY, name VARCHAR(100), description TEXT)",
            "INSERT INTO utf8_test (id, name, description) VALUES (1, '张三', '这是中文描述'), (2, 'Zoë', 'naïve café')",
        ],
    )
    .await;

    let out = gw
        .tools
        .execute_select_query(
            &caller("a"),
            select("SELECT id, name, description FROM utf8_test ORDER BY id"),
        )
        .await
        .unwrap();

    assert_eq!(
        table_rows(&out),
        vec![
            vec!["1".to_string(), "张三".to_string(), "这是中文描述".to_string()],
            vec!["2".to_string(), "Zoë".to_string(), "naïve café".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_wide_cells_keep_table_aligned() {
    let gw = gateway().await;
    seed(
        &gw,
        &[
            "CREATE TABLE greetings (lang TEXT, text TEXT)",
            "INSERT INTO greetings VALUES ('ja', 'こんにちは'), ('en', 'hello'), ('emoji', '👋🌍')",
        ],
    )
    .await;

    let out = gw
        .tools
        .get_sample_data(SampleDataInput {
            table: "greetings".to_string(),
            schema: None,
            limit: None,
        })
        .await
        .unwrap();

    let widths: Vec<usize> = out
        .lines()
        .filter(|l| l.starts_with('+') || l.starts_with('|'))
        .map(|l| l.width())
        .collect();
    assert_eq!(widths.len(), 7, "{out}");
    assert!(widths.windows(2).all(|w| w[0] == w[1]), "{out}");
}

#[tokio::test]
async fn test_unicode_identifiers_are_quoted() {
    let gw = gateway().await;
    seed(
        &gw,
        &[
            "CREATE TABLE \"用户\" (\"编号\" INTEGER PRIMARY KEY, \"名字\" TEXT NOT NULL)",
            "INSERT INTO \"用户\" VALUES (1, '李四')",
        ],
    )
    .await;

    let description = gw
        .tools
        .describe_table(DescribeTableInput {
            table: "用户".to_string(),
            schema: None,
        })
        .await
        .unwrap();
    assert!(description.starts_with("Table: main.用户\n"));
    assert!(description.contains("编号"));

    let sample = gw
        .tools
        .get_sample_data(SampleDataInput {
            table: "用户".to_string(),
            schema: None,
            limit: Some(1),
        })
        .await
        .unwrap();
    assert_eq!(
        table_rows(&sample),
        vec![vec!["1".to_string(), "李四".to_string()]]
    );
}

#[tokio::test]
async fn test_binary_values_render_as_text_or_base64() {
    let gw = gateway().await;
    seed(
        &gw,
        &[
            "CREATE TABLE blobs (id INTEGER PRIMARY KEY, payload BLOB)",
            "INSERT INTO blobs VALUES (1, X'FF00'), (2, X'6869'), (3, NULL)",
        ],
    )
    .await;

    let out = gw
        .tools
        .execute_select_query(
            &caller("a"),
            select("SELECT id, payload FROM blobs ORDER BY id"),
        )
        .await
        .unwrap();
    assert_eq!(
        table_rows(&out),
        vec![
            vec!["1".to_string(), "/wA=".to_string()],
            vec!["2".to_string(), "hi".to_string()],
            vec!["3".to_string(), "NULL".to_string()],
        ]
    );
}
