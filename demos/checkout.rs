//! Drives a simulated checkout page end to end.
//!
//! ```sh
//! cargo run --example checkout
//! ```

use std::sync::Arc;

use serde_json::json;

use dgx_engine::{init_tracing, ElementSpec, Engine, HudQueue, SimDom, WorkflowDefinition};

fn build_page() -> SimDom {
    let dom = SimDom::new();
    let root = dom.root();
    dom.set_url("https://shop.example/cart");

    dom.append(
        &root,
        ElementSpec::new("input").id("coupon").attr("name", "coupon"),
    );
    dom.append(
        &root,
        ElementSpec::new("button")
            .attr("role", "button")
            .attr("aria-label", "Apply coupon"),
    );
    let list = dom.append(
        &root,
        ElementSpec::new("ul")
            .id("cart-lines")
            .rect(0.0, 0.0, 600.0, 300.0)
            .scrollable(600.0, 900.0),
    );
    for (index, name) in ["Teapot", "Kettle", "Infuser"].iter().enumerate() {
        dom.append(
            &list,
            ElementSpec::new("li")
                .class("line")
                .text(*name)
                .rect(index as f64 * 300.0, 0.0, 600.0, 40.0),
        );
    }
    dom.append(
        &root,
        ElementSpec::new("span").id("total").text("Total: 89 EUR"),
    );
    dom
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let dom = build_page();
    let hud = HudQueue::new(64);
    let engine = Engine::builder(Arc::new(dom.clone()))
        .hud(hud.clone())
        .selector_map_json(&json!({
            "cart.coupon": {
                "tries": [
                    { "kind": "name", "name": "coupon" },
                    { "kind": "css", "selector": "#coupon" }
                ]
            },
            "cart.apply": {
                "tries": [ { "kind": "role", "role": "button", "name": "Apply coupon" } ]
            },
            "cart.lines": {
                "tries": [ { "kind": "css", "selector": "#cart-lines" } ]
            },
            "cart.total": {
                "tries": [ { "kind": "css", "selector": "#total" } ]
            }
        }))
        .build();

    let definition: WorkflowDefinition = serde_json::from_value(json!({
        "id": "apply-coupon",
        "defaults": { "timeoutMs": 4000 },
        "steps": [
            { "kind": "type", "key": "cart.coupon",
              "value": { "source": "literal", "value": "TEATIME" } },
            { "kind": "click", "key": "cart.apply" },
            { "kind": "collectList", "key": "cart.lines",
              "itemCss": ".line", "to": "lines", "shape": "text" },
            { "kind": "scrollUntil",
              "until": { "kind": "end" },
              "containerKey": "cart.lines", "delayMs": 0 },
            { "kind": "capture", "key": "cart.total",
              "from": { "kind": "regex", "pattern": "\\d+" }, "to": "total" },
            { "kind": "if",
              "condition": { "kind": "urlContains", "fragment": "/cart" },
              "then": [
                  { "kind": "log", "message": "cart total is ${ctx:total}" }
              ] }
        ]
    }))?;

    let outcome = engine.run(&definition).await?;
    println!("status: {:?}", outcome.status);
    println!("completed steps: {}", outcome.completed_steps);
    println!(
        "context: {}",
        serde_json::to_string_pretty(&outcome.context_snapshot)?
    );

    for notification in hud.drain() {
        println!("{}: {}", notification.title, notification.description);
    }
    Ok(())
}
