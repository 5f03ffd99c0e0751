//! Scrolls a simulated infinite feed until a sentinel row appears, then
//! waits for the mutation stream to settle and collects the rows.
//!
//! ```sh
//! cargo run --example infinite_feed
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use dgx_engine::{init_tracing, ElementSpec, Engine, SimDom, WorkflowDefinition};

const ROW_HEIGHT: f64 = 40.0;

fn build_feed() -> (SimDom, dgx_engine::NodeHandle) {
    let dom = SimDom::new();
    let root = dom.root();
    let feed = dom.append(
        &root,
        ElementSpec::new("div")
            .id("feed")
            .rect(0.0, 0.0, 800.0, 400.0)
            .scrollable(800.0, 4000.0),
    );
    for index in 0..10 {
        dom.append(
            &feed,
            ElementSpec::new("article")
                .class("post")
                .text(format!("Post #{index}"))
                .rect(index as f64 * ROW_HEIGHT, 0.0, 800.0, ROW_HEIGHT),
        );
    }
    (dom, feed)
}

/// Feeds new posts in while the engine scrolls, ending with a sentinel.
async fn feed_pump(dom: SimDom, feed: dgx_engine::NodeHandle) {
    for index in 10..30 {
        tokio::time::sleep(Duration::from_millis(40)).await;
        dom.append(
            &feed,
            ElementSpec::new("article")
                .class("post")
                .text(format!("Post #{index}"))
                .rect(index as f64 * ROW_HEIGHT, 0.0, 800.0, ROW_HEIGHT),
        );
    }
    dom.append(
        &feed,
        ElementSpec::new("article")
            .class("post")
            .attr("data-sentinel", "end")
            .text("You're all caught up")
            .rect(30.0 * ROW_HEIGHT, 0.0, 800.0, ROW_HEIGHT),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let (dom, feed) = build_feed();
    let engine = Engine::builder(Arc::new(dom.clone()))
        .selector_map_json(&json!({
            "feed": { "tries": [ { "kind": "css", "selector": "#feed" } ] },
            "feed.sentinel": {
                "tries": [ { "kind": "dataAttr", "attribute": "data-sentinel", "value": "end" } ]
            }
        }))
        .build();

    let pump = tokio::spawn(feed_pump(dom.clone(), feed));

    let definition: WorkflowDefinition = serde_json::from_value(json!({
        "id": "drain-feed",
        "steps": [
            { "kind": "scrollUntil",
              "until": { "kind": "element", "key": "feed.sentinel" },
              "containerKey": "feed",
              "stepPx": 200, "delayMs": 50, "maxAttempts": 60 },
            { "kind": "waitForIdle", "key": "feed", "idleMs": 150 },
            { "kind": "collectList", "key": "feed",
              "itemCss": ".post", "to": "posts", "shape": "text" },
            { "kind": "assert",
              "assertion": { "kind": "elementExists", "key": "feed.sentinel" } }
        ]
    }))?;

    let outcome = engine.run(&definition).await?;
    pump.await?;

    println!("status: {:?}", outcome.status);
    let posts = outcome.context_snapshot["posts"]
        .as_array()
        .map(Vec::len)
        .unwrap_or(0);
    println!("collected {posts} posts");
    Ok(())
}
