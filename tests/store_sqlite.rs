// tests/store_sqlite.rs
use aq_forecast_sync::forecast::{DayForecast, ForecastRecord, GeoPoint, ParsedSummary, SummaryRecord};
use aq_forecast_sync::store::{ForecastStore, SqliteStore};
use chrono::{DateTime, TimeZone, Utc};

fn at(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 4, h, 0, 0).unwrap()
}

fn site(name: &str, value: i64, updated: DateTime<Utc>) -> ForecastRecord {
    ForecastRecord {
        name: name.into(),
        updated,
        location: GeoPoint::point(51.5, -0.1),
        forecast: vec![DayForecast {
            day: "Wed".into(),
            value,
        }],
    }
}

#[tokio::test]
async fn upsert_replaces_by_name_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forecasts.db");

    {
        let store = SqliteStore::open(&path).await.unwrap();
        store.ensure_indexes().await.unwrap();
        assert_eq!(
            store
                .upsert_forecasts(&[site("A", 1, at(0)), site("B", 2, at(0))])
                .await
                .unwrap(),
            2
        );
        store.upsert_forecasts(&[site("A", 7, at(1))]).await.unwrap();
    }

    let store = SqliteStore::open(&path).await.unwrap();
    // Reopening must tolerate the existing index.
    store.ensure_indexes().await.unwrap();
    let all = store.forecasts().await.unwrap();
    assert_eq!(all.len(), 2);
    let a = all.iter().find(|r| r.name == "A").unwrap();
    assert_eq!(a.forecast[0].value, 7);
    assert_eq!(a.updated, at(1));
    let b = all.iter().find(|r| r.name == "B").unwrap();
    assert_eq!(*b, site("B", 2, at(0)));
}

#[tokio::test]
async fn summary_is_replaced_not_appended() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    assert!(store.latest_summary().await.unwrap().is_none());

    let first = SummaryRecord::latest("a.TXT", ParsedSummary::default(), at(4));
    let second = SummaryRecord::latest(
        "b.TXT",
        ParsedSummary {
            today: Some("Low.".into()),
            ..Default::default()
        },
        at(5),
    );
    store.replace_summary(&first).await.unwrap();
    store.replace_summary(&second).await.unwrap();

    assert_eq!(store.latest_summary().await.unwrap(), Some(second));
    assert_eq!(store.count_summaries_updated_between(at(0), at(23)).await.unwrap(), 1);
}

#[tokio::test]
async fn counts_respect_bounds() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store
        .upsert_forecasts(&[site("A", 1, at(1)), site("B", 1, at(10)), site("C", 1, at(20))])
        .await
        .unwrap();

    assert_eq!(store.count_forecasts_updated_between(at(0), at(23)).await.unwrap(), 3);
    assert_eq!(store.count_forecasts_updated_between(at(2), at(10)).await.unwrap(), 1);
    assert_eq!(store.count_forecasts_updated_between(at(21), at(23)).await.unwrap(), 0);
}
