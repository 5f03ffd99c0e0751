//! Cross-module scroll engine behavior: detection feeding the runners.

use std::sync::Arc;

use dgx_dom::{DomBackend, ElementSpec, SimDom};
use dgx_scroll::{
    ImmediateFrames, IntoViewOptions, IntoViewScroller, ScrollTelemetry, ScrollUntilOptions,
    ScrollUntilRunner, ScrollUntilStatus, UntilCondition,
};

fn telemetry() -> Arc<ScrollTelemetry> {
    Arc::new(ScrollTelemetry::default())
}

#[tokio::test]
async fn into_view_detects_its_own_container() {
    let dom = SimDom::new();
    let root = dom.root();
    let pane = dom.append(
        &root,
        ElementSpec::new("div")
            .id("pane")
            .rect(0.0, 0.0, 300.0, 200.0)
            .scrollable(300.0, 1000.0),
    );
    let target = dom.append(&pane, ElementSpec::new("p").rect(600.0, 0.0, 300.0, 30.0));

    let scroller = IntoViewScroller::new(
        Arc::new(dom.clone()),
        Arc::new(ImmediateFrames),
        telemetry(),
    );
    let outcome = scroller
        .scroll_into_view(&target, &IntoViewOptions::default())
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.container, Some(pane));
    assert_eq!(dom.scroll_top(&pane), 600.0);
}

#[tokio::test(start_paused = true)]
async fn scroll_until_detects_via_an_anchor() {
    let dom = SimDom::new();
    let root = dom.root();
    let pane = dom.append(
        &root,
        ElementSpec::new("div")
            .rect(0.0, 0.0, 300.0, 200.0)
            .scrollable(300.0, 800.0),
    );
    let anchor = dom.append(&pane, ElementSpec::new("ul"));

    let runner = ScrollUntilRunner::new(Arc::new(dom.clone()), telemetry());
    let mut options = ScrollUntilOptions::new(UntilCondition::End { threshold_px: None });
    options.anchor = Some(anchor);
    options.delay_ms = Some(0);
    let result = runner.run(options).await;
    assert_eq!(result.status, ScrollUntilStatus::Success);
    assert_eq!(result.container, Some(pane));
    assert_eq!(dom.scroll_top(&pane), 600.0);
}

#[tokio::test(start_paused = true)]
async fn document_scrolling_works_end_to_end() {
    let dom = SimDom::new();
    dom.set_document_scroll(1280.0, 3000.0);
    let runner = ScrollUntilRunner::new(Arc::new(dom.clone()), telemetry());
    let mut options = ScrollUntilOptions::new(UntilCondition::End {
        threshold_px: Some(5.0),
    });
    options.delay_ms = Some(0);
    options.step_px = Some(500.0);
    let result = runner.run(options).await;
    assert_eq!(result.status, ScrollUntilStatus::Success);
    let state = dom.scroll_state(&dom.root()).unwrap();
    assert!(state.max_scroll_top() - state.scroll_top <= 5.0);
}
