//! Runs against a server started with `cargo run` (or `spin up` on the same
//! port). Ignored by default.

use serde_json::json;
use std::time::Instant;

const BASE_URL: &str = "http://127.0.0.1:8000";

async fn register_and_login(client: &reqwest::Client, prefix: &str) -> (String, String) {
    let tag = uuid::Uuid::new_v4().to_string()[0..8].to_string();
    let email = format!("{}_{}@example.com", prefix, tag);
    let password = "password123";

    let resp = client
        .post(&format!("{}/register", BASE_URL))
        .json(&json!({ "username": format!("{}_{}", prefix, tag), "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), 201);
    let registered = resp.json::<serde_json::Value>().await.unwrap();
    let user_id = registered["user"]["id"].as_str().unwrap().to_string();

    let resp = client
        .post(&format!("{}/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to login");
    assert_eq!(resp.status(), 200);
    let login = resp.json::<serde_json::Value>().await.unwrap();
    let token = login["token"].as_str().unwrap().to_string();

    (user_id, token)
}

#[ignore]
#[tokio::test]
async fn test_full_social_flow() {
    let client = reqwest::Client::new();
    let (alice_id, alice_token) = register_and_login(&client, "alice").await;
    let (bob_id, bob_token) = register_and_login(&client, "bob").await;

    // Alice posts
    let resp = client
        .post(&format!("{}/posts?caption=live%20test", BASE_URL))
        .header("Authorization", format!("Bearer {}", alice_token))
        .header("Content-Type", "image/png")
        .body(vec![0x89u8, b'P', b'N', b'G'])
        .send()
        .await
        .expect("Failed to create post");
    assert_eq!(resp.status(), 201);
    let created = resp.json::<serde_json::Value>().await.unwrap();
    let post_id = created["post"]["id"].as_str().unwrap().to_string();

    // Bob follows, likes and comments
    let resp = client
        .post(&format!("{}/follow/{}", BASE_URL, alice_id))
        .header("Authorization", format!("Bearer {}", bob_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.json::<serde_json::Value>().await.unwrap()["status"], "followed");

    let resp = client
        .post(&format!("{}/posts/{}/like", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", bob_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(&format!("{}/posts/{}/comment", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", bob_token))
        .json(&json!({ "text": "great shot" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Messages both ways land in one conversation
    for (token, to, text) in [(&alice_token, &bob_id, "hi"), (&bob_token, &alice_id, "yo")] {
        let resp = client
            .post(&format!("{}/messages/send/{}", BASE_URL, to))
            .header("Authorization", format!("Bearer {}", token))
            .json(&json!({ "message": text }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }
    let resp = client
        .get(&format!("{}/messages/all/{}", BASE_URL, bob_id))
        .header("Authorization", format!("Bearer {}", alice_token))
        .send()
        .await
        .unwrap();
    let listed = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(listed["messages"].as_array().unwrap().len(), 2);

    // Delete cascades
    let resp = client
        .delete(&format!("{}/posts/{}", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", alice_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = client
        .get(&format!("{}/posts/{}/comments", BASE_URL, post_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn perf_test_concurrent_likes() {
    const LIKERS: usize = 50;
    let client = reqwest::Client::new();
    let (_, author_token) = register_and_login(&client, "author").await;

    let resp = client
        .post(&format!("{}/posts?caption=popular", BASE_URL))
        .header("Authorization", format!("Bearer {}", author_token))
        .header("Content-Type", "image/png")
        .body(vec![0x89u8, b'P', b'N', b'G'])
        .send()
        .await
        .unwrap();
    let created = resp.json::<serde_json::Value>().await.unwrap();
    let post_id = created["post"]["id"].as_str().unwrap().to_string();

    let mut tokens = Vec::new();
    for i in 0..LIKERS {
        tokens.push(register_and_login(&client, &format!("liker{}", i)).await.1);
    }

    let start = Instant::now();
    let mut tasks = Vec::new();
    for token in tokens {
        let client = client.clone();
        let uri = format!("{}/posts/{}/like", BASE_URL, post_id);
        tasks.push(tokio::spawn(async move {
            client
                .post(&uri)
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await
                .map(|r| r.status().as_u16())
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 200);
    }
    println!("{} concurrent likes in {:?}", LIKERS, start.elapsed());

    let resp = client
        .post(&format!("{}/posts/{}/like", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", author_token))
        .send()
        .await
        .unwrap();
    let liked = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(liked["likes"], LIKERS + 1);
}
