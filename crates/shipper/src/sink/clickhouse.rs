//! ClickHouse — batch inserts over the ClickHouse HTTP interface.
//!
//! One flush is one `INSERT ... FORMAT JSONEachRow` request whose body has
//! a JSON object per record, keyed by ClickHouse column name.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;

use super::convert::typed_value;
use super::{Sink, SinkError, SinkFuture};
use crate::conf::ClickHouseConfig;
use crate::parser::ParsedRecord;

#[derive(Debug, Clone)]
pub struct ClickHouseSink {
    client: Client,
    endpoint: String,
    insert_query: String,
    user: String,
    password: String,
    /// (ClickHouse column, nginx variable), in column order.
    columns: Vec<(String, String)>,
}

impl ClickHouseSink {
    pub fn new(config: &ClickHouseConfig) -> Result<Self, SinkError> {
        let endpoint = if config.host.starts_with("http://") || config.host.starts_with("https://") {
            format!("{}:{}/", config.host.trim_end_matches('/'), config.port)
        } else {
            format!("http://{}:{}/", config.host, config.port)
        };
        Self::with_endpoint(config, endpoint)
    }

    /// Build a sink against an explicit base URL instead of `host:port`.
    pub fn with_endpoint(config: &ClickHouseConfig, endpoint: String) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SinkError::Client(e.to_string()))?;

        let columns: Vec<(String, String)> = config
            .columns
            .iter()
            .map(|(column, variable)| (column.clone(), variable.clone()))
            .collect();

        let column_list = columns
            .iter()
            .map(|(column, _)| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ");

        let insert_query = format!(
            "INSERT INTO {}.{} ({}) FORMAT JSONEachRow",
            quote_identifier(&config.db),
            quote_identifier(&config.table),
            column_list
        );

        Ok(Self {
            client,
            endpoint,
            insert_query,
            user: config.user.clone(),
            password: config.password.clone(),
            columns,
        })
    }

    pub fn insert_query(&self) -> &str {
        &self.insert_query
    }

    /// Encode records as JSONEachRow: one object per line.
    pub fn encode(&self, records: &[ParsedRecord]) -> Result<Vec<u8>, SinkError> {
        let mut body = Vec::with_capacity(records.len() * 256);
        for record in records {
            let mut row = Map::with_capacity(self.columns.len());
            for (column, variable) in &self.columns {
                let raw = record.get(variable).unwrap_or("-");
                row.insert(column.clone(), typed_value(variable, raw));
            }
            serde_json::to_writer(&mut body, &Value::Object(row))?;
            body.push(b'\n');
        }
        Ok(body)
    }

    async fn insert(&self, records: Vec<ParsedRecord>) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let body = self.encode(&records)?;
        debug!(rows = records.len(), bytes = body.len(), "Sending insert to ClickHouse");

        let mut request = self
            .client
            .post(&self.endpoint)
            .query(&[("query", self.insert_query.as_str())])
            .body(body);
        if !self.user.is_empty() {
            request = request.basic_auth(&self.user, Some(&self.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

impl Sink for ClickHouseSink {
    fn save(&self, records: Vec<ParsedRecord>) -> SinkFuture<'_> {
        Box::pin(self.insert(records))
    }

    fn describe(&self) -> String {
        format!("clickhouse {}", self.endpoint)
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "\\`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::collections::BTreeMap;

    fn config(columns: &[(&str, &str)]) -> ClickHouseConfig {
        ClickHouseConfig {
            db: "metrics".to_string(),
            table: "nginx".to_string(),
            user: "writer".to_string(),
            password: "pw".to_string(),
            timeout_secs: 5,
            columns: columns
                .iter()
                .map(|(c, v)| (c.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..ClickHouseConfig::default()
        }
    }

    fn record(pairs: &[(&str, &str)]) -> ParsedRecord {
        ParsedRecord::new(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_insert_query_lists_columns() {
        let sink = ClickHouseSink::new(&config(&[("Status", "status"), ("Addr", "remote_addr")]))
            .expect("sink builds");
        assert_eq!(
            sink.insert_query(),
            "INSERT INTO `metrics`.`nginx` (`Addr`, `Status`) FORMAT JSONEachRow"
        );
    }

    #[test]
    fn test_endpoint_from_host_and_port() {
        let mut cfg = config(&[("Status", "status")]);
        cfg.host = "ch.internal".to_string();
        cfg.port = 8124;
        let sink = ClickHouseSink::new(&cfg).expect("sink builds");
        assert_eq!(sink.describe(), "clickhouse http://ch.internal:8124/");

        cfg.host = "https://ch.example.com".to_string();
        let sink = ClickHouseSink::new(&cfg).expect("sink builds");
        assert_eq!(sink.describe(), "clickhouse https://ch.example.com:8124/");
    }

    #[test]
    fn test_encode_json_each_row() {
        let sink = ClickHouseSink::new(&config(&[
            ("Status", "status"),
            ("Addr", "remote_addr"),
            ("Time", "time_local"),
        ]))
        .expect("sink builds");
        let body = sink
            .encode(&[
                record(&[("remote_addr", "1.2.3.4"), ("status", "200"), ("time_local", "10/Oct/2000:13:55:36 -0700")]),
                record(&[("remote_addr", "5.6.7.8"), ("status", "-")]),
            ])
            .expect("encodes");
        let text = String::from_utf8(body).expect("utf8");
        let rows: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("row is json"))
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Addr"], "1.2.3.4");
        assert_eq!(rows[0]["Status"], 200);
        assert_eq!(rows[0]["Time"], "2000-10-10 20:55:36");
        assert_eq!(rows[1]["Status"], 0);
        // Missing variable falls back to nginx's placeholder.
        assert_eq!(rows[1]["Time"], "-");
    }

    #[tokio::test]
    async fn test_save_posts_insert() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "INSERT INTO `metrics`.`nginx` (`Status`) FORMAT JSONEachRow".into(),
            ))
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .match_body("{\"Status\":200}\n{\"Status\":404}\n")
            .with_status(200)
            .create_async()
            .await;

        let sink = ClickHouseSink::with_endpoint(&config(&[("Status", "status")]), format!("{}/", server.url()))
            .expect("sink builds");
        sink.save(vec![record(&[("status", "200")]), record(&[("status", "404")])])
            .await
            .expect("save succeeds");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_save_reports_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("Code: 60. DB::Exception: Table metrics.nginx doesn't exist.")
            .create_async()
            .await;

        let sink = ClickHouseSink::with_endpoint(&config(&[("Status", "status")]), format!("{}/", server.url()))
            .expect("sink builds");
        let err = sink.save(vec![record(&[("status", "200")])]).await.unwrap_err();
        match err {
            SinkError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("doesn't exist"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_save_empty_batch_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/").match_query(Matcher::Any).expect(0).create_async().await;

        let sink = ClickHouseSink::with_endpoint(&config(&[("Status", "status")]), format!("{}/", server.url()))
            .expect("sink builds");
        sink.save(Vec::new()).await.expect("empty save is ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_save_transport_error() {
        // Nothing listens on port 1.
        let sink = ClickHouseSink::with_endpoint(&config(&[("Status", "status")]), "http://127.0.0.1:1/".to_string())
            .expect("sink builds");
        let err = sink.save(vec![record(&[("status", "200")])]).await.unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
    }
}
