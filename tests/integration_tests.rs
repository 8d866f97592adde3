//! Integration tests for the catchment binary
//!
//! Each stage is driven through the compiled binary with NDJSON on stdin. The
//! routing provider is a wiremock server, so no OSRM instance is needed.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use geo::Coord;
use serde_json::{json, Value};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use catchment::geodesy;

const BIN: &str = env!("CARGO_BIN_EXE_catchment");
const ORIGIN: Coord = Coord { x: 4.8952, y: 52.3702 };

/// Run the binary with `input` on stdin
fn run_catchment(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(BIN)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn catchment");

    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("Failed to write stdin");

    child.wait_with_output().expect("Failed to wait for catchment")
}

fn output_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is JSON"))
        .collect()
}

fn star_routes(count: usize, length: f64) -> Vec<Vec<[f64; 2]>> {
    (0..count)
        .map(|i| {
            let bearing = 360.0 / count as f64 * i as f64;
            (0..=8)
                .map(|step| {
                    let c = geodesy::destination(ORIGIN, bearing, length * step as f64 / 8.0);
                    [c.x, c.y]
                })
                .collect()
        })
        .collect()
}

fn routes_record(routes: &[Vec<[f64; 2]>], length: f64) -> Value {
    json!({
        "postcode": "1012AB",
        "origin": {"type": "Point", "coordinates": [ORIGIN.x, ORIGIN.y]},
        "distances": vec![length; routes.len()],
        "durations": vec![length / 1.4; routes.len()],
        "filteredRouteIndexes": (0..routes.len()).collect::<Vec<_>>(),
        "geometry": {"type": "MultiLineString", "coordinates": routes},
    })
}

#[test]
fn test_help_lists_every_stage() {
    let output = Command::new(BIN).arg("--help").output().unwrap();
    assert!(output.status.success());

    let help = String::from_utf8_lossy(&output.stdout);
    for stage in [
        "origins",
        "reachability",
        "routes",
        "analyze",
        "radial",
        "direct",
        "hexgrid",
        "hexagon-origins",
        "pois",
        "prepare",
    ] {
        assert!(help.contains(stage), "help should mention {stage}");
    }
}

#[test]
fn test_version() {
    let output = Command::new(BIN).arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_hexgrid_emits_polygons() {
    let output = run_catchment(&["hexgrid", "--bbox", "4.88,52.36,4.90,52.37", "--hex-size", "300"], "");
    assert!(output.status.success());

    let hexagons = output_lines(&output);
    assert!(!hexagons.is_empty());
    for hexagon in &hexagons {
        assert_eq!(hexagon["geometry"]["type"], "Polygon");
        // closed ring of six corners
        assert_eq!(hexagon["geometry"]["coordinates"][0].as_array().unwrap().len(), 7);
    }
}

#[test]
fn test_hexgrid_rejects_bad_bbox() {
    let output = run_catchment(&["hexgrid", "--bbox", "4.90,52.36,4.88"], "");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_origins_from_stdin() {
    let input = [
        r#"{"postcode":"1012AB","geometry":{"type":"Point","coordinates":[4.890,52.370]}}"#,
        r#"{"postcode":"1012CD","geometry":{"type":"Point","coordinates":[4.894,52.370]}}"#,
        r#"{"postcode":"1012EF","geometry":{"type":"Point","coordinates":[4.899,52.370]}}"#,
        r#"not json"#,
        r#"{"postcode":"1013AA","geometry":{"type":"Point","coordinates":[4.880,52.380]}}"#,
    ]
    .join("\n");

    let output = run_catchment(&["origins", "--postcode-length", "4"], &input);
    assert!(output.status.success());

    let origins = output_lines(&output);
    assert_eq!(origins.len(), 2);
    assert_eq!(origins[0]["postcode"], "1012");
    assert_eq!(origins[0]["origin"]["coordinates"], json!([4.894, 52.370]));
    assert_eq!(origins[1]["postcode"], "1013");
}

#[test]
fn test_hexagon_origins_from_hexgrid() {
    let output = run_catchment(&["hexgrid", "--bbox", "4.88,52.36,4.90,52.37", "--hex-size", "300"], "");
    let hexagons = String::from_utf8_lossy(&output.stdout).to_string();

    let mut addresses = tempfile::NamedTempFile::new().unwrap();
    // about 1.5 km apart, so never in the same hexagon
    for (id, (x, y)) in [(4.8813, 52.3612), (4.8987, 52.3688)].iter().enumerate() {
        writeln!(
            addresses,
            "{}",
            json!({"osmId": id, "housenumber": "1", "postcode": "1012AB", "geometry": {"type": "Point", "coordinates": [x, y]}})
        )
        .unwrap();
    }
    // no house number
    writeln!(
        addresses,
        "{}",
        json!({"postcode": "1012AB", "geometry": {"type": "Point", "coordinates": [4.8995, 52.3695]}})
    )
    .unwrap();

    let path = addresses.path().to_str().unwrap();
    let output = run_catchment(&["hexagon-origins", "--addresses", path, "--concurrency", "1"], &hexagons);
    assert!(output.status.success());

    let origins = output_lines(&output);
    assert_eq!(origins.len(), 2);
    for origin in &origins {
        assert_eq!(origin["postcode"], "1012AB");
        assert_eq!(origin["housenumber"], "1");
        assert_eq!(origin["origin"]["type"], "Point");
    }
}

#[test]
fn test_hexagon_origins_without_usable_addresses_fails() {
    let mut addresses = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        addresses,
        "{}",
        json!({"postcode": "1012AB", "geometry": {"type": "Point", "coordinates": [4.89, 52.36]}})
    )
    .unwrap();
    let path = addresses.path().to_str().unwrap();
    let output = run_catchment(&["hexagon-origins", "--addresses", path], "");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_pois_from_features() {
    let input = [
        json!({"tags": {"shop": "supermarket", "name": "Markt"}, "geometry": {"type": "Point", "coordinates": [4.89, 52.36]}}),
        json!({"tags": {"amenity": "university"}, "geometry": {"type": "Polygon", "coordinates": [[[4.0, 52.0], [4.2, 52.0], [4.2, 52.2], [4.0, 52.2], [4.0, 52.0]]]}}),
        json!({"tags": {"highway": "bus_stop"}, "geometry": {"type": "Point", "coordinates": [4.88, 52.35]}}),
        json!({"tags": {"highway": "residential"}, "geometry": {"type": "LineString", "coordinates": [[4.88, 52.35], [4.89, 52.35]]}}),
    ]
    .iter()
    .map(Value::to_string)
    .collect::<Vec<_>>()
    .join("\n");

    let output = run_catchment(&["pois", "--concurrency", "1"], &input);
    assert!(output.status.success());

    let mut pois = output_lines(&output);
    pois.sort_by_key(|p| p["type"].as_str().unwrap_or_default().to_string());
    let types: Vec<&str> = pois.iter().map(|p| p["type"].as_str().unwrap()).collect();
    assert_eq!(types, vec!["publicTransport", "schools", "shops"]);
    assert_eq!(pois[2]["shop"], "supermarket");
    assert!(pois[2].get("name").is_none());
    assert_eq!(pois[1]["geometry"]["type"], "Point");
}

#[test]
fn test_origins_with_invalid_postcode_length_exits_with_error() {
    let output = run_catchment(&["origins", "--postcode-length", "3"], "");
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_analyze_then_prepare() {
    let routes = star_routes(8, 800.0);
    let input = format!("{}\n", routes_record(&routes, 800.0));

    let output = run_catchment(&["analyze"], &input);
    assert!(output.status.success());
    let analyses = output_lines(&output);
    assert_eq!(analyses.len(), 1);

    let analysis = &analyses[0];
    assert_eq!(analysis["postcode"], "1012AB");
    assert!(analysis["area"]["area"].as_f64().unwrap() > 0.0);
    assert_eq!(analysis["area"]["geometry"]["type"], "Polygon");
    assert_eq!(analysis["routes"]["maxDistancePerSegment"], json!([800, 800, 800, 800, 800, 800, 800, 800]));
    assert_eq!(analysis["routes"]["stats"]["distanceRatiosMean"], 1.0);

    let output = run_catchment(&["prepare"], &format!("{analysis}\n"));
    assert!(output.status.success());
    let prepared = output_lines(&output);
    assert_eq!(prepared.len(), 1);
    // 800 m routes in 250 m chunks
    assert_eq!(prepared[0]["chunks"].as_array().unwrap().len(), 8 * 4);
}

#[test]
fn test_analyze_skips_records_without_routes() {
    let input = format!(
        "{}\n{}\n",
        routes_record(&[], 0.0),
        routes_record(&star_routes(4, 600.0), 600.0)
    );
    let output = run_catchment(&["analyze", "--concurrency", "1"], &input);
    assert!(output.status.success());
    assert_eq!(output_lines(&output).len(), 1);
}

/// Table responses for any number of destinations, every one a minute away
struct MinuteAway;

impl Respond for MinuteAway {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let coordinates: Vec<[f64; 2]> = request
            .url
            .path()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .split(';')
            .map(|pair| {
                let mut values = pair.split(',').map(|v| v.parse::<f64>().unwrap());
                [values.next().unwrap(), values.next().unwrap()]
            })
            .collect();

        let durations: Vec<f64> = (0..coordinates.len())
            .map(|i| if i == 0 { 0.0 } else { 60.0 })
            .collect();
        let destinations: Vec<Value> = coordinates.iter().map(|c| json!({"location": c})).collect();

        ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "durations": [durations],
            "destinations": destinations,
        }))
    }
}

async fn run_catchment_async(args: &[&str], input: &str) -> Output {
    use tokio::io::AsyncWriteExt;

    let mut child = tokio::process::Command::new(BIN)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn catchment");

    let mut stdin = child.stdin.take().expect("stdin is piped");
    stdin.write_all(input.as_bytes()).await.unwrap();
    drop(stdin);

    child.wait_with_output().await.unwrap()
}

#[tokio::test]
async fn test_reachability_against_mock_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/table/v1/walking/.+$"))
        .respond_with(MinuteAway)
        .mount(&server)
        .await;

    let input = format!(
        "{}\n{}\n",
        json!({"postcode": "1012AB", "origin": {"type": "Point", "coordinates": [ORIGIN.x, ORIGIN.y]}}),
        json!({"postcode": "1012", "origin": {"type": "Point", "coordinates": [ORIGIN.x, ORIGIN.y]}}),
    );
    let uri = server.uri();
    let output = run_catchment_async(
        &["reachability", "--minutes", "2", "--request-delay-ms", "0", "--osrm-url", &uri],
        &input,
    )
    .await;
    assert!(output.status.success());

    // the 4-character postcode does not match the default length of 6
    let records = output_lines(&output);
    assert_eq!(records.len(), 1);

    let record = &records[0];
    let durations = record["durations"].as_array().unwrap();
    let points = record["geometry"]["coordinates"].as_array().unwrap();
    assert!(!points.is_empty());
    assert_eq!(durations.len(), points.len());
    assert!(durations.iter().all(|d| d.as_u64() == Some(60)));
}

/// Route responses that walk straight from the first to the second coordinate
struct StraightRoute;

impl Respond for StraightRoute {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let ends: Vec<[f64; 2]> = request
            .url
            .path()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .split(';')
            .map(|pair| {
                let mut values = pair.split(',').map(|v| v.parse::<f64>().unwrap());
                [values.next().unwrap(), values.next().unwrap()]
            })
            .collect();
        let (from, to) = (ends[0], ends[1]);
        let middle = [(from[0] + to[0]) / 2.0, (from[1] + to[1]) / 2.0];

        ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "routes": [{
                "geometry": {"type": "LineString", "coordinates": [from, middle, to]},
                "distance": 160.0,
                "duration": 115.0,
                "legs": [{"annotation": {"nodes": [1, 2]}}]
            }]
        }))
    }
}

#[tokio::test]
async fn test_direct_routes_against_mock_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/route/v1/walking/.+$"))
        .respond_with(StraightRoute)
        .mount(&server)
        .await;

    let input = format!(
        "{}\n",
        json!({"postcode": "1012", "origin": {"type": "Point", "coordinates": [ORIGIN.x, ORIGIN.y]}})
    );
    let uri = server.uri();
    let output = run_catchment_async(
        &[
            "direct",
            "--minutes",
            "2",
            "--radials",
            "4",
            "--postcode-length",
            "4",
            "--request-delay-ms",
            "0",
            "--route-delay-ms",
            "0",
            "--osrm-url",
            &uri,
        ],
        &input,
    )
    .await;
    assert!(output.status.success());

    let records = output_lines(&output);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["destinations"]["coordinates"].as_array().unwrap().len(), 4);
    assert_eq!(record["routes"]["coordinates"].as_array().unwrap().len(), 4);
    assert!(record["meanDistanceToDestination"].as_f64().unwrap() < 1e-3);
    assert!((record["meanDistanceRatio"].as_f64().unwrap() - 1.0).abs() < 1e-3);
}

#[tokio::test]
async fn test_routes_with_failing_provider_skips_origin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/route/v1/walking/.+$"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let input = format!(
        "{}\n",
        json!({
            "postcode": "1012AB",
            "origin": {"type": "Point", "coordinates": [ORIGIN.x, ORIGIN.y]},
            "durations": [120, 60],
            "geometry": {"type": "MultiPoint", "coordinates": [[4.8970, 52.3702], [4.8952, 52.3712]]},
        })
    );
    let uri = server.uri();
    let output = run_catchment_async(
        &["routes", "--request-delay-ms", "0", "--route-delay-ms", "0", "--osrm-url", &uri],
        &input,
    )
    .await;

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}
