//! End-to-end scenarios through the motion engine and a memory surface

use std::cell::RefCell;
use std::rc::Rc;

use glide_animation::controls::AnimationControls;
use glide_animation::definition::AnimationDefinition;
use glide_animation::easing::Easing;
use glide_animation::transition::Transition;
use glide_core::error::GlideError;
use glide_core::geometry::LayoutBox;
use glide_core::surface::{InstanceId, Position};
use glide_core::value::Value;
use tracing_subscriber::EnvFilter;

use crate::config::{EngineConfig, LayoutConfig};
use crate::engine::MotionEngine;
use crate::node::LayoutAnimationType;
use crate::scroll::{ScrollHandler, ScrollInfoOptions};
use crate::surface::MemorySurface;
use crate::visual_element::{ElementKind, MotionProps};

const EPS: f32 = 1e-3;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn rect(x: f32, y: f32, w: f32, h: f32) -> LayoutBox {
    LayoutBox::from_rect(x, y, w, h)
}

fn linear(duration_ms: f32) -> Transition {
    Transition::tween(duration_ms, Easing::Linear)
}

/// Engine over a 1000×1000 page with linear 100 ms layout animations
fn page_engine() -> (Rc<MemorySurface>, MotionEngine, InstanceId) {
    init_tracing();
    let surface = Rc::new(MemorySurface::new());
    let page = surface.create_root(rect(0.0, 0.0, 1000.0, 1000.0));
    let config = EngineConfig {
        layout: LayoutConfig {
            threshold_px: 0.5,
            transition: linear(100.0),
        },
        ..Default::default()
    };
    let engine = MotionEngine::builder(surface.clone())
        .config(config)
        .native_host(surface.clone())
        .handoff_host(surface.clone())
        .build();
    (surface, engine, page)
}

/// Tick frames 20 ms apart starting at `start`; returns the next timestamp
fn run_frames(engine: &MotionEngine, start: f64, count: usize) -> f64 {
    let mut ts = start;
    for _ in 0..count {
        engine.frame(ts);
        ts += 20.0;
    }
    ts
}

type Log = Rc<RefCell<Vec<&'static str>>>;

fn record(log: &Log, entry: &'static str) -> impl Fn(&()) + 'static {
    let log = log.clone();
    move |_| log.borrow_mut().push(entry)
}

// ============================================================================
// Layout animation
// ============================================================================

#[test]
fn test_layout_change_animates_back_to_identity() {
    let (surface, engine, page) = page_engine();
    let card = surface.append(page, rect(0.0, 0.0, 100.0, 100.0));
    let id = engine.create_element(
        ElementKind::Html,
        None,
        MotionProps::new().with_layout(LayoutAnimationType::Both),
    );
    engine.mount(id, card);
    let ts = run_frames(&engine, 0.0, 1);

    let log: Log = Rc::default();
    let events = engine.events(id).unwrap();
    let _ = events.before_layout_measure.subscribe(record(&log, "before-measure"));
    let _ = events.layout_measure.subscribe({
        let log = log.clone();
        move |_| log.borrow_mut().push("measure")
    });
    let _ = events.layout_update.subscribe({
        let log = log.clone();
        move |update| {
            assert!(update.has_changed);
            log.borrow_mut().push("update")
        }
    });
    let _ = events.layout_animation_start.subscribe(record(&log, "start"));
    let _ = events.layout_animation_complete.subscribe(record(&log, "complete"));

    engine.will_update();
    surface.set_layout(card, rect(50.0, 50.0, 200.0, 200.0));
    engine.did_update();
    let ts = run_frames(&engine, ts, 1);

    let node = engine.projection_node(id).unwrap();
    let delta = engine
        .with_projection(|tree| tree.get(node).and_then(|n| n.layout_delta()))
        .unwrap();
    assert!((delta.x.scale - 2.0).abs() < EPS);
    assert!((delta.y.scale - 2.0).abs() < EPS);
    assert!((delta.x.translate - 50.0).abs() < EPS);
    assert!((delta.y.translate - 50.0).abs() < EPS);
    assert!(engine.with_projection(|tree| tree.is_animating()));
    assert!(surface.transform(card).contains("scale("));
    // The pass frame paints the snapshot box unadvanced
    assert_eq!(
        engine.with_projection(|tree| tree.get(node).and_then(|n| n.animation_progress())),
        Some(0.0)
    );

    run_frames(&engine, ts, 8);
    assert!(engine.with_projection(|tree| tree.get(node).unwrap().projection_delta().is_identity()));
    assert_eq!(surface.transform(card), "none");
    assert!(!engine.is_running());

    let log = log.borrow();
    let position = |entry| log.iter().position(|e| *e == entry).unwrap();
    assert!(position("before-measure") < position("measure"));
    assert!(position("measure") < position("update"));
    assert!(position("update") < position("start"));
    assert!(position("start") < position("complete"));
    assert_eq!(log.iter().filter(|e| **e == "complete").count(), 1);
}

#[test]
fn test_layout_change_below_threshold_does_not_animate() {
    init_tracing();
    let surface = Rc::new(MemorySurface::new());
    let page = surface.create_root(rect(0.0, 0.0, 1000.0, 1000.0));
    let config = EngineConfig::from_toml_str("[layout]\nthreshold_px = 10.0\n").unwrap();
    let engine = MotionEngine::builder(surface.clone()).config(config).build();

    let card = surface.append(page, rect(0.0, 0.0, 100.0, 100.0));
    let id = engine.create_element(
        ElementKind::Html,
        None,
        MotionProps::new().with_layout(LayoutAnimationType::Both),
    );
    engine.mount(id, card);
    let ts = run_frames(&engine, 0.0, 1);

    engine.will_update();
    surface.set_layout(card, rect(5.0, 0.0, 100.0, 100.0));
    engine.did_update();
    run_frames(&engine, ts, 1);

    assert!(!engine.with_projection(|tree| tree.is_animating()));
    assert_eq!(surface.transform(card), "none");
}

#[test]
fn test_nested_document_boxes_ignore_page_scroll() {
    let (surface, engine, page) = page_engine();
    let outer = surface.append(page, rect(20.0, 30.0, 400.0, 400.0));
    let inner = surface.append(outer, rect(50.0, 80.0, 100.0, 100.0));

    let parent = engine.create_element(ElementKind::Html, None, MotionProps::new().with_layout(LayoutAnimationType::Both));
    let child = engine.create_element(
        ElementKind::Html,
        Some(parent),
        MotionProps::new().with_layout(LayoutAnimationType::Both),
    );
    engine.mount(parent, outer);
    engine.mount(child, inner);

    engine.will_update();
    let parent_node = engine.projection_node(parent).unwrap();
    let child_node = engine.projection_node(child).unwrap();
    let (first, parent_doc) = engine.with_projection(|tree| {
        (
            *tree.get(child_node).unwrap().layout().unwrap(),
            tree.get(parent_node).unwrap().layout().unwrap().document,
        )
    });
    assert_eq!(tree_parent(&engine, child_node), Some(parent_node));
    assert_eq!(first.local.to_document(&parent_doc), first.document);

    surface.set_document_scroll(0.0, 250.0);
    engine.will_update();
    let second = engine.with_projection(|tree| *tree.get(child_node).unwrap().layout().unwrap());
    assert_eq!(first, second);
}

fn tree_parent(engine: &MotionEngine, node: crate::node::NodeId) -> Option<crate::node::NodeId> {
    engine.with_projection(|tree| tree.get(node).and_then(|n| n.parent()))
}

#[test]
fn test_shared_layout_id_hands_box_to_successor() {
    let (surface, engine, page) = page_engine();
    let thumb = surface.append(page, rect(0.0, 0.0, 100.0, 100.0));
    let first = engine.create_element(ElementKind::Html, None, MotionProps::new().with_layout_id("hero"));
    engine.mount(first, thumb);
    let ts = run_frames(&engine, 0.0, 1);

    engine.will_update();
    engine.unmount(first);
    surface.remove(thumb);

    let full = surface.append(page, rect(200.0, 200.0, 400.0, 300.0));
    let second = engine.create_element(ElementKind::Html, None, MotionProps::new().with_layout_id("hero"));
    let node = engine.projection_node(second).unwrap();
    assert_eq!(
        engine.with_projection(|tree| tree.get(node).and_then(|n| n.snapshot())),
        Some(rect(0.0, 0.0, 100.0, 100.0))
    );

    engine.mount(second, full);
    run_frames(&engine, ts, 1);
    let delta = engine
        .with_projection(|tree| tree.get(node).and_then(|n| n.layout_delta()))
        .unwrap();
    assert!((delta.x.scale - 4.0).abs() < EPS);
    assert!((delta.y.scale - 3.0).abs() < EPS);
    assert!(engine.with_projection(|tree| tree.is_animating()));
}

// ============================================================================
// Scroll measurement
// ============================================================================

#[test]
fn test_scroll_handler_in_read_phase() {
    let (surface, engine, page) = page_engine();
    let container = surface.append(page, rect(0.0, 0.0, 300.0, 300.0));
    surface.set_position(container, Position::Relative);
    surface.set_scroll_size(container, 500.0, 1200.0);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let handler = {
        let seen = seen.clone();
        Rc::new(RefCell::new(ScrollHandler::new(
            container,
            ScrollInfoOptions::default(),
            move |info| seen.borrow_mut().push(info.clone()),
        )))
    };
    let job = engine.batcher().schedule(
        glide_core::frameloop::Phase::Read,
        {
            let surface = surface.clone();
            let handler = handler.clone();
            move |frame| {
                let mut handler = handler.borrow_mut();
                handler.measure(surface.as_ref());
                handler.update(surface.as_ref(), frame.timestamp_ms);
                handler.notify();
            }
        },
        true,
    );

    engine.frame(0.0);
    surface.set_scroll(container, 0.0, 450.0);
    engine.frame(20.0);
    job.cancel();
    engine.frame(40.0);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    let info = &seen[1];
    assert_eq!(info.x.target_length, 500.0);
    assert_eq!(info.x.container_length, 300.0);
    assert_eq!(info.y.current, 450.0);
    assert!((info.y.progress - 0.5).abs() < EPS);
    assert!(info.y.velocity > 0.0);
}

// ============================================================================
// Value animation
// ============================================================================

#[test]
fn test_controls_resolve_after_every_element() {
    let (surface, engine, page) = page_engine();
    let controls = AnimationControls::new();
    let definition = AnimationDefinition::new().value("x", 100.0f32);
    assert!(matches!(
        controls.start(&definition),
        Err(GlideError::ControlsNotMounted)
    ));

    let mut ids = Vec::new();
    for duration in [20.0, 40.0, 60.0] {
        let instance = surface.append(page, rect(0.0, 0.0, 10.0, 10.0));
        let id = engine.create_element(
            ElementKind::Html,
            None,
            MotionProps::new()
                .with_style("x", 0.0f32)
                .with_transition(linear(duration))
                .with_controls(&controls),
        );
        engine.mount(id, instance);
        ids.push(id);
    }
    assert_eq!(controls.subscriber_count(), 3);

    let _mount = controls.mount();
    let done = controls.start(&definition).unwrap();
    let ts = run_frames(&engine, 0.0, 2);
    assert!(!done.is_resolved());
    assert_eq!(engine.get_value(ids[0], "x"), Some(Value::Number(100.0)));

    run_frames(&engine, ts, 2);
    assert!(done.is_resolved());
    pollster::block_on(done);
    for id in &ids {
        assert_eq!(engine.get_value(*id, "x"), Some(Value::Number(100.0)));
    }

    engine.unmount(ids[0]);
    assert_eq!(controls.subscriber_count(), 2);
}

#[test]
fn test_native_rejection_falls_back_to_stopping_the_value() {
    let (surface, engine, page) = page_engine();
    surface.set_reject_native(true);
    let instance = surface.append(page, rect(0.0, 0.0, 10.0, 10.0));
    let id = engine.create_element(
        ElementKind::Html,
        None,
        MotionProps::new()
            .with_style("opacity", 0.2f32)
            .with_transition(linear(200.0).prefer_native())
            .with_animate(AnimationDefinition::new().value("opacity", 1.0f32)),
    );
    engine.mount(id, instance);

    let complete: Log = Rc::default();
    let _ = engine.events(id).unwrap().animation_complete.subscribe({
        let complete = complete.clone();
        move |_| complete.borrow_mut().push("complete")
    });

    // The animate prop starts after the first render
    run_frames(&engine, 0.0, 2);
    assert_eq!(*complete.borrow(), vec!["complete"]);
    assert!(!engine.is_animating(id, "opacity"));
    assert_eq!(surface.style(instance, "opacity").as_deref(), Some("0.2"));
    assert!(surface.native_animations().is_empty());
}

#[test]
fn test_stop_commits_native_value() {
    let (surface, engine, page) = page_engine();
    let instance = surface.append(page, rect(0.0, 0.0, 10.0, 10.0));
    let id = engine.create_element(ElementKind::Html, None, MotionProps::new().with_style("opacity", 0.4f32));
    engine.mount(id, instance);
    let ts = run_frames(&engine, 0.0, 1);

    let done = engine
        .animate(
            id,
            &AnimationDefinition::new()
                .value("opacity", 1.0f32)
                .with_transition(linear(300.0).prefer_native()),
        )
        .unwrap();
    let native = surface.native_animations();
    assert_eq!(native.len(), 1);
    let (target, keyframes, timing) = surface.native_animation(native[0]).unwrap();
    assert_eq!(target, instance);
    assert_eq!(keyframes.values, vec![Value::Number(0.4), Value::Number(1.0)]);
    assert_eq!(timing.duration_ms, 300.0);

    engine.stop(id);
    run_frames(&engine, ts, 1);
    assert!(done.is_resolved());
    assert!(surface.native_animations().is_empty());
    assert_eq!(engine.get_value(id, "opacity"), Some(Value::Number(0.4)));
}

#[test]
fn test_handoff_window_covers_one_mount_pass() {
    let (surface, engine, page) = page_engine();
    for appear_id in ["a", "b", "c"] {
        surface.add_optimized_animation(appear_id, "opacity", 30.0);
    }
    let props = |appear_id: &str| MotionProps {
        optimized_appear_id: Some(appear_id.to_string()),
        ..MotionProps::new()
            .with_style("opacity", 0.0f32)
            .with_transition(linear(60.0))
            .with_animate(AnimationDefinition::new().value("opacity", 1.0f32))
    };

    let mut ids = Vec::new();
    for appear_id in ["a", "b"] {
        let instance = surface.append(page, rect(0.0, 0.0, 10.0, 10.0));
        let id = engine.create_element(ElementKind::Html, None, props(appear_id));
        engine.mount(id, instance);
        ids.push(id);
    }
    for id in &ids {
        assert_eq!(engine.get_value(*id, "opacity"), Some(Value::Number(0.5)));
    }

    engine.batcher().flush_microtasks();
    assert!(engine.handoff_state().is_complete());

    let late = surface.append(page, rect(0.0, 0.0, 10.0, 10.0));
    let id = engine.create_element(ElementKind::Html, None, props("c"));
    engine.mount(id, late);
    assert_eq!(engine.get_value(id, "opacity"), Some(Value::Number(0.0)));
    assert!(!engine.is_animating(id, "opacity"));
}

// ============================================================================
// Rendering
// ============================================================================

#[test]
fn test_svg_values_render_as_attributes() {
    let (surface, engine, page) = page_engine();
    let circle = surface.append(page, rect(0.0, 0.0, 20.0, 20.0));
    let id = engine.create_element(
        ElementKind::Svg,
        None,
        MotionProps::new()
            .with_style("cx", 10.0f32)
            .with_style("opacity", 0.5f32)
            .with_style("--accent", "red")
            .with_style("rotate", 90.0f32),
    );
    engine.mount(id, circle);
    engine.frame(0.0);

    assert_eq!(surface.attribute(circle, "cx").as_deref(), Some("10"));
    assert_eq!(surface.style(circle, "opacity").as_deref(), Some("0.5"));
    assert_eq!(surface.style(circle, "--accent").as_deref(), Some("red"));
    assert_eq!(surface.transform(circle), "rotate(90deg)");
}

#[test]
fn test_update_notifies_latest_values() {
    let (surface, engine, page) = page_engine();
    let instance = surface.append(page, rect(0.0, 0.0, 10.0, 10.0));
    let id = engine.create_element(ElementKind::Html, None, MotionProps::new().with_style("width", 10.0f32));
    engine.mount(id, instance);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let _ = engine.events(id).unwrap().update.subscribe({
        let seen = seen.clone();
        move |latest| seen.borrow_mut().push(latest.get("width").cloned())
    });
    engine.frame(0.0);
    assert_eq!(surface.style(instance, "width").as_deref(), Some("10px"));

    engine.update(
        id,
        MotionProps::new().with_style("width", 30.0f32),
        Default::default(),
    );
    engine.frame(20.0);
    assert_eq!(surface.style(instance, "width").as_deref(), Some("30px"));
    assert_eq!(
        *seen.borrow(),
        vec![Some(Value::Number(10.0)), Some(Value::Number(30.0))]
    );
}
