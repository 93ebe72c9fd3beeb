//! `HttpStore` against a local listener serving canned responses.

use dynadoc::dynadoc_engine::wire::{GetItemInput, ListTablesInput, PutItemInput};
use dynadoc::dynadoc_engine::{AttributeValue, Item, Key};
use dynadoc::{HttpStore, KvStore, StoreConfig};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One request as received by the listener.
#[derive(Debug)]
struct Recorded {
    head: String,
    body: Value,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }
}

/// Answer one connection per canned `(status, body)` and record each request.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut recorded = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            recorded.push(read_request(&mut socket).await);

            let reason = if status == 200 { "OK" } else { "Bad Request" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\n\
                 content-type: application/x-amz-json-1.0\r\n\
                 content-length: {}\r\n\
                 connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
        recorded
    });

    (endpoint, handle)
}

async fn read_request(socket: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before the request was complete");
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).into_owned();
        let length = head
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);

        let body = &buf[end + 4..];
        if body.len() >= length {
            return Recorded {
                body: serde_json::from_slice(&body[..length]).unwrap(),
                head,
            };
        }
    }
}

fn store(endpoint: String) -> HttpStore {
    HttpStore::new(&StoreConfig {
        endpoint,
        region: "eu-test-1".into(),
        authorization: Some("Bearer local".into()),
        ..Default::default()
    })
    .unwrap()
}

fn key(id: &str) -> Key {
    Key::from([("_id".to_string(), AttributeValue::String(id.into()))])
}

#[tokio::test]
async fn sends_target_headers_and_decodes_items() {
    let (endpoint, server) = serve(vec![(
        200,
        r#"{"Item":{"_id":{"S":"a"},"age":{"N":"5"},"tags":{"SS":["x","y"]}}}"#,
    )])
    .await;

    let output = store(endpoint)
        .get_item(GetItemInput {
            table_name: "users".into(),
            key: key("a"),
            consistent_read: None,
        })
        .await
        .unwrap();

    let item = output.item.unwrap();
    assert_eq!(item["_id"], AttributeValue::String("a".into()));
    assert_eq!(item["age"], AttributeValue::Number("5".into()));
    assert_eq!(
        item["tags"],
        AttributeValue::StringSet(vec!["x".into(), "y".into()])
    );

    let requests = server.await.unwrap();
    let request = &requests[0];
    assert!(request.head.starts_with("POST / "));
    assert_eq!(request.header("x-amz-target"), Some("DynamoDB_20120810.GetItem"));
    assert_eq!(
        request.header("content-type"),
        Some("application/x-amz-json-1.0")
    );
    assert_eq!(request.header("authorization"), Some("Bearer local"));
    assert_eq!(request.header("x-dynadoc-region"), Some("eu-test-1"));
    assert_eq!(
        request.body,
        json!({"TableName": "users", "Key": {"_id": {"S": "a"}}})
    );
}

#[tokio::test]
async fn error_bodies_become_service_errors() {
    let (endpoint, server) = serve(vec![
        (
            400,
            r#"{"__type":"com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException","message":"The conditional request failed"}"#,
        ),
        (500, "upstream unavailable"),
    ])
    .await;
    let store = store(endpoint);

    let put = PutItemInput {
        table_name: "users".into(),
        item: Item::from([("_id".to_string(), AttributeValue::String("a".into()))]),
        condition_expression: Some("attribute_not_exists(#id)".into()),
        expression_attribute_names: [("#id".to_string(), "_id".to_string())].into(),
        expression_attribute_values: Default::default(),
    };
    let err = store.put_item(put).await.unwrap_err();
    assert!(err.is_conditional_check_failed());
    assert_eq!(
        err.to_string(),
        "ConditionalCheckFailedException: The conditional request failed"
    );

    let err = store
        .list_tables(ListTablesInput::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("HttpStatus500"));
    assert_eq!(err.to_string(), "HttpStatus500: upstream unavailable");

    let requests = server.await.unwrap();
    assert_eq!(requests[0].header("x-amz-target"), Some("DynamoDB_20120810.PutItem"));
    assert_eq!(
        requests[0].body["ConditionExpression"],
        json!("attribute_not_exists(#id)")
    );
    assert_eq!(requests[1].header("x-amz-target"), Some("DynamoDB_20120810.ListTables"));
    assert_eq!(requests[1].body, json!({}));
}

#[tokio::test]
async fn table_listing_follows_continuation() {
    let (endpoint, server) = serve(vec![
        (200, r#"{"TableNames":["audit","projects"],"LastEvaluatedTableName":"projects"}"#),
        (200, r#"{"TableNames":["users"]}"#),
    ])
    .await;
    let store = store(endpoint);

    let mut names = Vec::new();
    let mut input = ListTablesInput {
        exclusive_start_table_name: None,
        limit: Some(2),
    };
    loop {
        let page = store.list_tables(input.clone()).await.unwrap();
        names.extend(page.table_names);
        match page.last_evaluated_table_name {
            Some(last) => input.exclusive_start_table_name = Some(last),
            None => break,
        }
    }
    assert_eq!(names, vec!["audit", "projects", "users"]);

    let requests = server.await.unwrap();
    assert_eq!(requests[0].body, json!({"Limit": 2}));
    assert_eq!(
        requests[1].body,
        json!({"ExclusiveStartTableName": "projects", "Limit": 2})
    );
}
