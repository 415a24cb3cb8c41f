use chrono::{TimeZone, Utc};
use hit_tracker::buffer::{Buffer, BufferWriter};
use hit_tracker::builder::{Builder, Endpoint, MultihitPolicy};
use hit_tracker::domain::{Param, ParamOption};
use serde_json::json;

fn endpoint() -> Endpoint {
    Endpoint {
        secure: true,
        log: "logp".into(),
        log_ssl: "logs".into(),
        domain: "xiti.com".into(),
        pixel_path: "/hit.xiti".into(),
        site: "549808".into(),
    }
}

fn query_value(url: &str, key: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[test]
fn test_single_hit_in_call_order() {
    let mut buffer = Buffer::new();
    let mut writer = BufferWriter::new(&mut buffer);
    writer.set("type", "screen").set("p", "Home");
    assert!(writer.finish().is_empty());

    let output = Builder::default().build(&endpoint(), &buffer.params());
    assert_eq!(output.hits.len(), 1);
    assert_eq!(
        output.hits[0].url,
        "https://logs.xiti.com/hit.xiti?s=549808&type=screen&p=Home"
    );
}

#[test]
fn test_last_non_append_set_wins() {
    let mut buffer = Buffer::new();
    let mut writer = BufferWriter::new(&mut buffer);
    writer
        .set("p", "First")
        .set_with("x", 1, ParamOption::default().persistent())
        .set("p", "Second")
        .set("x", 2);
    drop(writer);

    let output = Builder::default().build(&endpoint(), &buffer.params());
    let url = &output.hits[0].url;
    assert_eq!(url.matches("&p=").count(), 1);
    assert_eq!(url.matches("&x=").count(), 1);
    assert_eq!(query_value(url, "p").as_deref(), Some("Second"));
    assert_eq!(query_value(url, "x").as_deref(), Some("2"));
}

#[test]
fn test_volatile_params_are_consumed_once() {
    let mut buffer = Buffer::new();
    let mut writer = BufferWriter::new(&mut buffer);
    writer
        .set_with("site_section", "news", ParamOption::default().persistent())
        .set("p", "Home");
    drop(writer);

    let builder = Builder::default();
    let first = builder.build(&endpoint(), &buffer.params());
    buffer.clear_volatile();
    let second = builder.build(&endpoint(), &buffer.params());

    assert!(first.hits[0].url.contains("&site_section=news&p=Home"));
    assert!(second.hits[0].url.ends_with("&site_section=news"));
}

#[test]
fn test_appended_json_is_merged_and_encoded() {
    let mut buffer = Buffer::new();
    let mut writer = BufferWriter::new(&mut buffer);
    let stc = ParamOption::default().append().encode();
    writer.set_with("stc", json!({"a": 1}), stc).set_with("stc", json!({"b": "x y"}), stc);
    drop(writer);

    let output = Builder::default().build(&endpoint(), &buffer.params());
    let url = &output.hits[0].url;
    assert_eq!(url.matches("&stc=").count(), 1);
    let merged: serde_json::Value = serde_json::from_str(&query_value(url, "stc").unwrap()).unwrap();
    assert_eq!(merged, json!({"a": 1, "b": "x y"}));
}

#[test]
fn test_oversize_hit_is_split_with_shared_linkage() {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let persistent = ParamOption::default().persistent();
    let mut params = vec![
        Param::eager("ts", "1714564800.000000", persistent),
        Param::eager("idclient", "visitor-1", persistent),
    ];
    for i in 0..10 {
        params.push(Param::eager(format!("k{i}"), "v".repeat(300), ParamOption::default()));
    }

    let output = Builder::new(MultihitPolicy::default()).build_at(&endpoint(), &params, created_at);
    assert!(output.warnings.is_empty());
    assert!(output.hits.len() > 1);

    let count = output.hits.len();
    let mut multihit_ids = Vec::new();
    for (index, hit) in output.hits.iter().enumerate() {
        assert!(hit.url.len() <= 1600);
        assert_eq!(hit.created_at, created_at);
        assert_eq!(query_value(&hit.url, "ts").as_deref(), Some("1714564800.000000"));
        assert_eq!(query_value(&hit.url, "idclient").as_deref(), Some("visitor-1"));

        let mh = query_value(&hit.url, "mh").unwrap();
        let parts: Vec<&str> = mh.split('-').collect();
        assert_eq!(parts[0], (index + 1).to_string());
        assert_eq!(parts[1], count.to_string());
        multihit_ids.push(parts[2].to_string());
    }
    multihit_ids.dedup();
    assert_eq!(multihit_ids.len(), 1);

    let carried: usize = output
        .hits
        .iter()
        .map(|hit| (0..10).filter(|i| hit.url.contains(&format!("&k{i}="))).count())
        .sum();
    assert_eq!(carried, 10);
}

#[test]
fn test_too_many_parts_sends_error_hit() {
    let policy = MultihitPolicy {
        max_hits: 2,
        ..MultihitPolicy::default()
    };
    let mut params = vec![Param::eager("ts", "1.0", ParamOption::default().persistent())];
    for i in 0..10 {
        params.push(Param::eager(format!("k{i}"), "v".repeat(400), ParamOption::default()));
    }

    let output = Builder::new(policy).build(&endpoint(), &params);
    assert_eq!(output.hits.len(), 1);
    assert!(output.hits[0].url.ends_with("&ts=1.0&mherr=1"));
    assert_eq!(output.warnings.len(), 1);
}

#[test]
fn test_oversize_page_label_still_produces_a_hit() {
    let params = vec![
        Param::eager("ts", "1.0", ParamOption::default().persistent()),
        Param::eager("p", "x".repeat(2000), ParamOption::default()),
    ];

    let output = Builder::new(MultihitPolicy::default()).build(&endpoint(), &params);
    assert_eq!(output.hits.len(), 1);
    let url = &output.hits[0].url;
    assert_eq!(query_value(url, "p").map(|p| p.len()), Some(2000));
    assert!(query_value(url, "mh").is_some_and(|mh| mh.starts_with("1-1-")));
    assert_eq!(output.warnings, vec!["Parameter p is too long to fit in a single hit".to_string()]);
}
