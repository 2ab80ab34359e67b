//! HTTP boundary tests using mock servers
//!
//! Covers the Gemini provider's request and error mapping, and every event
//! source on its own and through the event catalog.

use chrono::{TimeZone, Utc};
use chrono_tz::America::Montreal;
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use concierge_engine::config::{EventsConfig, LLMConfig};
use concierge_engine::events::curated::CURATED_SOURCE;
use concierge_engine::events::{
    EventCatalog, EventSource, EventbriteSource, GooglePlacesSource, OpenDataSource,
    TicketmasterSource,
};
use concierge_engine::llm::gemini::GeminiProvider;
use concierge_engine::llm::{GenerationParams, LLMError, Message, TextGenerator};
use sdk::types::{EventCategory, PriceRange};

fn gemini(server: &MockServer) -> GeminiProvider {
    let config = LLMConfig {
        base_url: server.uri(),
        model: "gemini-test".to_string(),
        ..LLMConfig::default()
    };
    GeminiProvider::new(config, "test-key")
}

#[tokio::test]
async fn test_gemini_generate_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Osheaga is "}, {"text": "in August."}]}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = gemini(&server);
    let messages = vec![
        Message::system("You are a festival concierge."),
        Message::user("When is Osheaga?"),
    ];

    let text = provider
        .generate(&messages, GenerationParams::default())
        .await
        .unwrap();
    assert_eq!(text, "Osheaga is in August.");
}

#[tokio::test]
async fn test_gemini_status_mapping() {
    let cases = [
        (429, LLMError::RateLimitExceeded),
        (401, LLMError::AuthenticationFailed(String::new())),
        (500, LLMError::ProviderUnavailable(String::new())),
        (400, LLMError::InvalidRequest(String::new())),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let err = gemini(&server)
            .generate(&[Message::user("hi")], GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(
            std::mem::discriminant(&err),
            std::mem::discriminant(&expected),
            "status {} mapped to {:?}",
            status,
            err
        );
        assert_eq!(err.is_transient(), expected.is_transient());
    }
}

#[tokio::test]
async fn test_gemini_blocked_and_empty_responses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let err = gemini(&server)
        .generate(&[Message::user("hi")], GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::InvalidRequest(_)));

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "   "}]}}]
        })))
        .mount(&server)
        .await;

    let err = gemini(&server)
        .generate(&[Message::user("hi")], GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::ParseError(_)));
}

#[tokio::test]
async fn test_gemini_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/gemini-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "models/gemini-test"})))
        .mount(&server)
        .await;

    assert!(gemini(&server).check_health().await);
}

#[tokio::test]
async fn test_ticketmaster_normalizes_events() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/events.json"))
        .and(query_param("apikey", "tm-key"))
        .and(query_param("keyword", "festival"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"events": [
                {
                    "name": "Montreal Rock Festival",
                    "url": "https://tm.example/1",
                    "dates": {"start": {"dateTime": "2025-07-12T23:00:00Z"}},
                    "priceRanges": [{"min": 45.0, "max": 120.0, "currency": "CAD"}],
                    "_embedded": {"venues": [{
                        "name": "Place des Arts",
                        "address": {"line1": "175 Rue Sainte-Catherine O"},
                        "city": {"name": "Montreal"},
                        "state": {"stateCode": "QC"}
                    }]}
                },
                {
                    "name": "Local Date Only Fest",
                    "dates": {"start": {"localDate": "2025-07-20", "localTime": "19:30:00"}}
                }
            ]}
        })))
        .mount(&server)
        .await;

    let source = TicketmasterSource::new(
        &server.uri(),
        "tm-key".to_string(),
        &EventsConfig::default(),
        Montreal,
        Duration::from_secs(5),
    );

    let events = source.fetch(now).await.unwrap();
    assert_eq!(events.len(), 2);

    let rock = &events[0];
    assert_eq!(rock.category, EventCategory::Music);
    assert_eq!(rock.metro, "Place-des-Arts");
    assert_eq!(rock.address, "175 Rue Sainte-Catherine O, Montreal, QC");
    assert_eq!(rock.price, Some(PriceRange::new(45.0, 120.0, "CAD")));
    assert_eq!(rock.source, "Ticketmaster");

    // 19:30 EDT is 23:30 UTC
    let local = &events[1];
    assert_eq!(local.start, Utc.with_ymd_and_hms(2025, 7, 20, 23, 30, 0).unwrap());
    assert_eq!(local.venue, "Unknown Venue");
}

#[tokio::test]
async fn test_eventbrite_uses_bearer_token() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/events/search/"))
        .and(header("authorization", "Bearer eb-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [{
                "name": {"text": "Free Film Screening Festival"},
                "url": "https://eb.example/2",
                "start": {"utc": "2025-07-05T00:00:00Z"},
                "is_free": true
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = EventbriteSource::new(
        &server.uri(),
        "eb-token".to_string(),
        &EventsConfig::default(),
        Duration::from_secs(5),
    );

    let events = source.fetch(now).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].category, EventCategory::Film);
    assert!(events[0].price.as_ref().unwrap().is_free());
    assert_eq!(events[0].address, "Montreal");
}

#[tokio::test]
async fn test_catalog_falls_back_when_sources_fail() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let config = EventsConfig::default();
    let sources: Vec<Box<dyn EventSource>> = vec![
        Box::new(TicketmasterSource::new(
            &server.uri(),
            "tm-key".to_string(),
            &config,
            Montreal,
            Duration::from_secs(5),
        )),
        Box::new(EventbriteSource::new(
            &server.uri(),
            "eb-token".to_string(),
            &config,
            Duration::from_secs(5),
        )),
    ];

    let catalog = EventCatalog::new(sources, 50, Montreal);
    assert_eq!(catalog.source_names(), vec!["ticketmaster", "eventbrite"]);

    let events = catalog.collect(now).await;
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e.source == CURATED_SOURCE));
}

#[tokio::test]
async fn test_catalog_drops_events_outside_window() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/events/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                {"name": {"text": "Summer Dance Festival"}, "start": {"utc": "2025-07-10T20:00:00Z"}},
                {"name": {"text": "Winter Dance Festival"}, "start": {"utc": "2026-02-10T20:00:00Z"}},
                {"name": {"text": "ok"}, "start": {"utc": "2025-07-10T20:00:00Z"}}
            ]
        })))
        .mount(&server)
        .await;

    let source = EventbriteSource::new(
        &server.uri(),
        "eb-token".to_string(),
        &EventsConfig::default(),
        Duration::from_secs(5),
    );
    let catalog = EventCatalog::new(vec![Box::new(source)], 50, Montreal);

    let events = catalog.collect(now).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "Summer Dance Festival");
    assert_eq!(events[0].category, EventCategory::Dance);
}

#[tokio::test]
async fn test_google_places_lists_venues() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/textsearch/json"))
        .and(query_param("key", "places-key"))
        .and(query_param("query", "festival venue Montreal, Canada"))
        .and(query_param("radius", "50000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [
                {"name": "Place des Arts", "formatted_address": "175 Rue Sainte-Catherine O, Montreal"},
                {"name": "Theatre Plaza", "website": "https://plaza.example"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = GooglePlacesSource::new(
        &server.uri(),
        "places-key".to_string(),
        &EventsConfig::default(),
        Duration::from_secs(5),
    );

    let events = source.fetch(now).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].name, "Events at Place des Arts");
    assert_eq!(events[0].metro, "Place-des-Arts");
    assert_eq!(events[0].start, now);
    assert!(events[0].is_running_at(now));
    assert_eq!(events[1].category, EventCategory::Dance);
    assert_eq!(events[1].address, "Montreal");
    assert_eq!(events[1].url, "https://plaza.example");
    assert_eq!(events[1].source, "Google Places");
}

#[tokio::test]
async fn test_google_places_denied_status_is_an_error() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid.",
            "results": []
        })))
        .mount(&server)
        .await;

    let source = GooglePlacesSource::new(
        &server.uri(),
        "bad".to_string(),
        &EventsConfig::default(),
        Duration::from_secs(5),
    );

    let err = source.fetch(now).await.unwrap_err();
    assert!(err.to_string().contains("REQUEST_DENIED"));
}

#[tokio::test]
async fn test_open_data_reads_datastore_records() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/datastore_search"))
        .and(query_param("resource_id", "montreal-events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": {"records": [
                {
                    "name": "Festival d'art de rue",
                    "venue": "Quartier Latin",
                    "address": "Rue Saint-Denis, Quartier Latin, Montreal",
                    "start_date": "2025-07-12",
                    "end_date": "2025-07-14T23:00:00",
                    "price": "Gratuit"
                },
                {"name": "Undated gathering", "start_date": ""}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = OpenDataSource::new(&server.uri(), "montreal-events", Montreal, Duration::from_secs(5));

    let events = source.fetch(now).await.unwrap();
    assert_eq!(events.len(), 1);

    let festival = &events[0];
    assert_eq!(festival.category, EventCategory::Art);
    assert_eq!(festival.metro, "Berri-UQAM");
    assert_eq!(festival.start, Utc.with_ymd_and_hms(2025, 7, 12, 4, 0, 0).unwrap());
    assert_eq!(
        festival.end,
        Some(Utc.with_ymd_and_hms(2025, 7, 15, 3, 0, 0).unwrap())
    );
    assert!(festival.price.as_ref().unwrap().is_free());
    assert_eq!(festival.source, "Quebec Open Data");
}

#[tokio::test]
async fn test_catalog_merges_keyless_source() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/datastore_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": {"records": [
                {"name": "Nuit blanche comedy night", "start_date": "2025-07-05T20:00:00"}
            ]}
        })))
        .mount(&server)
        .await;

    let mut config = EventsConfig::default();
    config.open_data.base_url = server.uri();
    config.open_data.resource_id = Some("montreal-events".to_string());
    config.ticketmaster.api_key_env = "CONCIERGE_TEST_UNSET_TM".to_string();
    config.eventbrite.api_key_env = "CONCIERGE_TEST_UNSET_EB".to_string();
    config.google_places.api_key_env = "CONCIERGE_TEST_UNSET_PLACES".to_string();

    let catalog = EventCatalog::from_config(&config, Montreal);
    assert_eq!(catalog.source_names(), vec!["open_data"]);

    let events = catalog.collect(now).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].category, EventCategory::Comedy);
    assert_eq!(events[0].address, "Montreal");
}
