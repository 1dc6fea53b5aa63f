use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("xds".to_string()), None).unwrap();
    register_custom_metrics(&registry).unwrap();
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    STREAM_ERRORS.with_label_values(&["registry_probe"]).inc();
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"xds_stream_errors"),
        "Missing xds_stream_errors"
    );
}

#[test]
fn test_counter_increment() {
    let before = NACKS_RECEIVED.with_label_values(&["counter_probe"]).get();

    NACKS_RECEIVED.with_label_values(&["counter_probe"]).inc();
    NACKS_RECEIVED.with_label_values(&["counter_probe"]).inc();

    let value = NACKS_RECEIVED.with_label_values(&["counter_probe"]).get();
    assert_eq!(value - before, 2, "Counter should increment correctly");
}

#[test]
fn test_histogram_labels() {
    RESPONSE_RESOURCES_METRIC
        .with_label_values(&["histogram_probe_a"])
        .observe(3.0);
    RESPONSE_RESOURCES_METRIC
        .with_label_values(&["histogram_probe_b"])
        .observe(5.0);
    RESPONSE_RESOURCES_METRIC
        .with_label_values(&["histogram_probe_b"])
        .observe(7.0);

    assert_eq!(
        RESPONSE_RESOURCES_METRIC
            .with_label_values(&["histogram_probe_a"])
            .get_sample_count(),
        1
    );
    assert_eq!(
        RESPONSE_RESOURCES_METRIC
            .with_label_values(&["histogram_probe_b"])
            .get_sample_count(),
        2
    );
}

#[test]
fn test_gather_metrics_includes_default_registry() {
    RESPONSE_RESOURCES_METRIC
        .with_label_values(&["gather_probe"])
        .observe(1.0);
    assert!(gather_metrics().contains("response_resources"));
}
