//! Integration test: start the gateway on a free port with one seeded channel, then drive the
//! health probe, the subscription handshake, and a webhook delivery over HTTP.
//! The server task is left running when the test ends.

use inlet::config::{ChannelSeedConfig, Config};
use inlet::gateway;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn temp_config_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("inlet-gateway-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create config dir");
    let config_path = dir.join("config.json");
    std::fs::File::create(&config_path)
        .and_then(|mut f| f.write_all(b"{}"))
        .expect("write config.json");
    config_path
}

async fn wait_for_health(client: &reqwest::Client, base: &str) -> serde_json::Value {
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(base).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.json().await.expect("parse JSON");
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        base, last_err
    );
}

#[tokio::test]
async fn gateway_accepts_whatsapp_deliveries() {
    let port = free_port();
    let config_path = temp_config_path();

    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.whatsapp.verify_token = Some("verify-me".to_string());
    config.channels = vec![ChannelSeedConfig {
        id: Some("channel123".to_string()),
        identifier: "919876543210".to_string(),
        provider: "whatsapp".to_string(),
        bot_id: "bot123".to_string(),
        active: true,
    }];

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config, config_path).await;
    });

    let base = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let health = wait_for_health(&client, &base).await;
    assert_eq!(health.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(health.get("port").and_then(|v| v.as_u64()), Some(port as u64));
    assert_eq!(health.get("provider").and_then(|v| v.as_str()), Some("whatsapp"));

    let webhook = format!("{}whatsapp/webhook", base);

    if std::env::var("WHATSAPP_VERIFY_TOKEN").is_err() {
        let resp = client
            .get(&webhook)
            .query(&[
                ("hub.mode", "subscribe"),
                ("hub.verify_token", "verify-me"),
                ("hub.challenge", "1158201444"),
            ])
            .send()
            .await
            .expect("verify request");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.expect("challenge body"), "1158201444");
    }

    let resp = client
        .get(&webhook)
        .query(&[
            ("hub.mode", "subscribe"),
            ("hub.verify_token", "wrong"),
            ("hub.challenge", "1"),
        ])
        .send()
        .await
        .expect("verify request");
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);

    let delivery = json!({
        "object": "whatsapp_business_account",
        "entry": [{ "id": "some_id", "changes": [
            { "value": {
                "messaging_product": "whatsapp",
                "metadata": { "display_phone_number": "919876543210", "phone_number_id": "pnid" },
                "messages": [
                    { "from": "919999999999", "id": "m1", "timestamp": "1714990325",
                      "text": { "body": "How are you?" }, "type": "text" },
                    { "from": "919999999998", "id": "m2", "timestamp": "1714990326",
                      "text": { "body": "Hello" }, "type": "text" },
                ],
            }, "field": "messages" },
            { "value": {
                "messaging_product": "whatsapp",
                "metadata": { "display_phone_number": "15550000000", "phone_number_id": "other" },
                "messages": [
                    { "from": "919999999997", "id": "m3", "timestamp": "1714990327",
                      "text": { "body": "lost" }, "type": "text" },
                ],
            }, "field": "messages" },
        ]}],
    });
    let resp = client
        .post(&webhook)
        .json(&delivery)
        .send()
        .await
        .expect("webhook request");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(body.get("accepted").and_then(|v| v.as_u64()), Some(2));

    let resp = client
        .post(&webhook)
        .json(&json!({ "object": "whatsapp_business_account" }))
        .send()
        .await
        .expect("webhook request");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client
        .post(&webhook)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("webhook request");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    gateway_handle.abort();
}
