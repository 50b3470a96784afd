use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

fn fritzing_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fritzing"))
}

struct ChildGuard {
    child: Child,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn descriptor(module_id: &str, title: &str, family: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<module moduleId="{module_id}">
  <title>{title}</title>
  <author>Fritzing Part-o-matic</author>
  <tags><tag>{family}</tag></tags>
  <properties><property name="family">{family}</property></properties>
  <views>
    <breadboardView><layers image="breadboard/{module_id}.svg"/></breadboardView>
  </views>
  <connectors>
    <connector id="connector0" name="pin 1" type="male">
      <views><breadboardView><p layer="breadboard" svgId="connector0pin"/></breadboardView></views>
    </connector>
  </connectors>
</module>"#
    )
}

fn http_request(addr: &str, method: &str, path: &str, body: Option<&Value>) -> (u16, Value) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .ok();
    stream
        .set_write_timeout(Some(Duration::from_secs(5)))
        .ok();

    let body_bytes = body
        .map(|b| serde_json::to_vec(b).expect("serialize request"))
        .unwrap_or_default();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body_bytes.len()
    );

    stream.write_all(request.as_bytes()).expect("write request");
    stream.write_all(&body_bytes).expect("write body");
    stream.flush().ok();

    let mut response_bytes = Vec::new();
    stream
        .read_to_end(&mut response_bytes)
        .expect("read response");
    let response = String::from_utf8_lossy(&response_bytes);

    let status = response
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let (_, body_text) = response
        .split_once("\r\n\r\n")
        .unwrap_or(("", response.as_ref()));
    let json: Value = serde_json::from_str(body_text).expect("parse JSON response");
    (status, json)
}

fn wait_for_ready(path: &Path, child: &mut Child) -> String {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        if let Ok(text) = fs::read_to_string(path) {
            if let Ok(v) = serde_json::from_str::<Value>(&text) {
                if let Some(addr) = v.get("addr").and_then(Value::as_str) {
                    return addr.to_string();
                }
            }
        }
        if let Ok(Some(status)) = child.try_wait() {
            panic!("server exited early: {status}");
        }
        assert!(Instant::now() < deadline, "timed out waiting for ready file");
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn start_server(parts_dir: &Path, data_dir: &Path, ready_file: &Path) -> (ChildGuard, String) {
    let child = Command::new(fritzing_bin())
        .arg("serve")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .arg("--parts-dir")
        .arg(parts_dir)
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--db-name")
        .arg("e2e")
        .arg("--ready-file")
        .arg(ready_file)
        .env_remove("FRITZING_LISTEN")
        .env_remove("FRITZING_PARTS_DIR")
        .env_remove("FRITZING_DATA_DIR")
        .env_remove("FRITZING_DB_NAME")
        .env("RUST_LOG", "warn")
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("spawn fritzing serve");
    let mut guard = ChildGuard { child };
    let addr = wait_for_ready(ready_file, &mut guard.child);
    (guard, addr)
}

#[test]
fn serve_parts_and_projects_end_to_end() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let parts_dir = scratch.path().join("parts");
    let core = parts_dir.join("core");
    fs::create_dir_all(&core).expect("create core dir");
    fs::write(core.join("led.fzp"), descriptor("LEDModuleID", "Red LED", "LED")).unwrap();
    fs::write(
        core.join("resistor.fzp"),
        descriptor("ResistorModuleID", "220Ω Resistor", "Resistor"),
    )
    .unwrap();
    fs::write(core.join("broken.fzp"), "<module><title>oops</module>").unwrap();

    let ready_file = scratch.path().join("ready.json");
    let (_guard, addr) = start_server(&parts_dir, &scratch.path().join("data"), &ready_file);

    // Liveness
    let (status, health) = http_request(&addr, "GET", "/api/health", None);
    assert_eq!(status, 200);
    assert_eq!(health["status"], "healthy");
    let (status, _) = http_request(&addr, "GET", "/api/", None);
    assert_eq!(status, 200);

    // Load, then short-circuit on the second call
    let (status, loaded) = http_request(&addr, "POST", "/api/parts/load-fritzing-parts", None);
    assert_eq!(status, 200);
    assert_eq!(loaded["parts_loaded"], 2);
    assert_eq!(loaded["message"], "Successfully loaded 2 parts");
    let (_, again) = http_request(&addr, "POST", "/api/parts/load-fritzing-parts/", None);
    assert_eq!(again["parts_loaded"], 2);

    // Listing, search and families
    let (status, all) = http_request(&addr, "GET", "/api/parts/", None);
    assert_eq!(status, 200);
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let (_, found) = http_request(&addr, "GET", "/api/parts?search=led", None);
    let found = found.as_array().cloned().unwrap_or_default();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["module_id"], "LEDModuleID");
    assert_eq!(found[0]["image_path"], "/parts/svg/core/breadboard/LEDModuleID.svg");
    assert_eq!(found[0]["connectors"][0]["svg_id"], "connector0pin");

    let (_, families) = http_request(&addr, "GET", "/api/parts/families", None);
    assert_eq!(families, json!(["LED", "Resistor"]));

    let (status, err) = http_request(&addr, "GET", "/api/parts?limit=0", None);
    assert_eq!(status, 422);
    assert!(err["detail"].is_string());

    // Part CRUD
    let (status, created) = http_request(
        &addr,
        "POST",
        "/api/parts",
        Some(&json!({"title": "Pushbutton", "properties": {"family": "Switch"}})),
    );
    assert_eq!(status, 200);
    let part_id = created["id"].as_str().expect("part id").to_string();

    let (status, updated) = http_request(
        &addr,
        "PUT",
        &format!("/api/parts/{part_id}"),
        Some(&json!({"description": "momentary"})),
    );
    assert_eq!(status, 200);
    assert_eq!(updated["title"], "Pushbutton");
    assert_eq!(updated["description"], "momentary");

    let (status, _) = http_request(&addr, "POST", "/api/parts", Some(&json!({"title": ""})));
    assert_eq!(status, 422);

    let (status, msg) = http_request(&addr, "DELETE", &format!("/api/parts/{part_id}"), None);
    assert_eq!(status, 200);
    assert_eq!(msg["message"], "Part deleted successfully");
    let (status, missing) = http_request(&addr, "GET", &format!("/api/parts/{part_id}"), None);
    assert_eq!(status, 404);
    assert_eq!(missing["detail"], "Part not found");

    // Projects
    let (status, project) = http_request(
        &addr,
        "POST",
        "/api/projects",
        Some(&json!({
            "name": "Blinky",
            "parts": [{"part_id": "led", "position": {"x": 1.0, "y": 2.0}}],
            "canvas_settings": {"zoom": 2}
        })),
    );
    assert_eq!(status, 200);
    let project_id = project["id"].as_str().expect("project id").to_string();

    let (status, copy) = http_request(
        &addr,
        "POST",
        &format!("/api/projects/{project_id}/duplicate"),
        None,
    );
    assert_eq!(status, 200);
    assert_eq!(copy["name"], "Blinky (Copy)");
    assert_ne!(copy["id"], project["id"]);
    assert_eq!(copy["parts"], project["parts"]);

    let (_, named) = http_request(
        &addr,
        "POST",
        &format!("/api/projects/{project_id}/duplicate?new_name=Blinky%20v2"),
        None,
    );
    assert_eq!(named["name"], "Blinky v2");

    let (_, projects) = http_request(&addr, "GET", "/api/projects", None);
    let names: Vec<&str> = projects
        .as_array()
        .map(|ps| ps.iter().filter_map(|p| p["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["Blinky v2", "Blinky (Copy)", "Blinky"]);

    let (status, _) = http_request(&addr, "POST", "/api/projects/nope/duplicate", None);
    assert_eq!(status, 404);

    // Routing errors
    let (status, not_found) = http_request(&addr, "GET", "/api/widgets", None);
    assert_eq!(status, 404);
    assert_eq!(not_found["detail"], "Not Found");
    let (status, _) = http_request(&addr, "DELETE", "/api/parts", None);
    assert_eq!(status, 405);

    // Fixed part paths only own one method; the rest look up a part id
    let (status, missing) = http_request(&addr, "GET", "/api/parts/load-fritzing-parts", None);
    assert_eq!(status, 404);
    assert_eq!(missing["detail"], "Part not found");
    let (status, missing) = http_request(
        &addr,
        "PUT",
        "/api/parts/families",
        Some(&json!({"title": "Renamed"})),
    );
    assert_eq!(status, 404);
    assert_eq!(missing["detail"], "Part not found");
    let (status, missing) = http_request(&addr, "DELETE", "/api/parts/families", None);
    assert_eq!(status, 404);
    assert_eq!(missing["detail"], "Part not found");

    let (status, reloaded) = http_request(
        &addr,
        "POST",
        "/api/parts/load-fritzing-parts?force_reload=yes",
        None,
    );
    assert_eq!(status, 200);
    assert_eq!(reloaded["parts_loaded"], 2);
}
