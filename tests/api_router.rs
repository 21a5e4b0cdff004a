// tests/api_router.rs

mod common;
use crate::common::{fake_harness, init_tracing, tasks_dir};

use std::error::Error;
use std::path::{Path, PathBuf};

use rendertask::api::{ApiRequest, ApiResponse, Method, ResponseBody, Router};
use rendertask::config::EngineConfig;
use rendertask::types::{TaskId, TaskOutcome, TaskStatus};
use rendertask_test_utils::fake_backend::FakeBackend;
use rendertask_test_utils::{Harness, wait_for_status};
use serde_json::{Value, json};

type TestResult = Result<(), Box<dyn Error>>;

struct Api {
    router: Router<FakeBackend>,
    harness: Harness<FakeBackend>,
    fake: FakeBackend,
    upload_dir: PathBuf,
}

fn api(root: &Path) -> Api {
    let (harness, fake) = fake_harness(&tasks_dir(root));
    let upload_dir = root.join("uploads");
    let engine = EngineConfig {
        path: "/opt/blender/blender".to_string(),
        alias: "blender".to_string(),
    };
    let router = Router::new(harness.manager.clone(), engine, upload_dir.clone());
    Api {
        router,
        harness,
        fake,
        upload_dir,
    }
}

async fn get(api: &Api, target: &str) -> ApiResponse {
    api.router
        .handle(ApiRequest::new(Method::Get, target, Vec::new()))
        .await
}

async fn post(api: &Api, target: &str, body: Value) -> ApiResponse {
    api.router
        .handle(ApiRequest::new(Method::Post, target, body.to_string().into_bytes()))
        .await
}

async fn upload(api: &Api, target: &str, bytes: &[u8]) -> ApiResponse {
    api.router
        .handle(ApiRequest::new(Method::Post, target, bytes.to_vec()))
        .await
}

async fn submit(api: &Api, command: &str) -> Value {
    let resp = post(api, "/api/render", json!({ "command": command })).await;
    assert_eq!(resp.status, 200, "{:?}", resp.json_body());
    resp.json_body().unwrap()
}

#[tokio::test]
async fn submit_resolves_alias_and_upload_path() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let task = submit(&api, "blender -b /uploads/scene.blend -o /uploads/out -s 1 -e 10").await;

    let expected = format!(
        "/opt/blender/blender -b {}/scene.blend -o /uploads/out -s 1 -e 10",
        api.upload_dir.display()
    );
    assert_eq!(task["command"], expected);
    assert_eq!(task["status"], "running");
    assert!(task["id"].is_string());
    assert!(task["startTime"].is_string());
    assert!(task["workDir"].is_string());
    assert!(task.get("endTime").is_none());

    let launches = api.fake.launches();
    assert_eq!(launches[0].program, "/opt/blender/blender");
    Ok(())
}

#[tokio::test]
async fn submit_requires_command() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    for body in [json!({}), json!({ "command": "" }), json!({ "command": "  " })] {
        let resp = post(&api, "/api/render", body).await;
        assert_eq!(resp.status, 400);
        let err = resp.json_body()?;
        assert!(err["error"].as_str().unwrap().contains("Command is required"));
    }

    let resp = api
        .router
        .handle(ApiRequest::new(Method::Post, "/api/render", b"not json".to_vec()))
        .await;
    assert_eq!(resp.status, 400);
    assert!(api.harness.manager.get_all_tasks().is_empty());
    Ok(())
}

#[tokio::test]
async fn query_lists_and_fetches_tasks() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let empty = get(&api, "/api/render").await;
    assert_eq!(empty.status, 200);
    assert_eq!(empty.json_body()?, json!([]));

    let created = submit(&api, "blender -b scene.blend").await;
    let id = created["id"].as_str().unwrap();

    let all = get(&api, "/api/render").await.json_body()?;
    assert_eq!(all.as_array().map(Vec::len), Some(1));
    assert_eq!(all[0]["id"], id);

    let one = get(&api, &format!("/api/render?taskId={id}")).await;
    assert_eq!(one.status, 200);
    let body = one.json_body()?;
    assert_eq!(body["id"], id);
    assert!(body["logs"].as_str().unwrap().starts_with("start task\n"));
    Ok(())
}

#[tokio::test]
async fn query_unknown_or_malformed_id_is_404() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let unknown = get(&api, "/api/render?taskId=00000000-0000-4000-8000-000000000000").await;
    assert_eq!(unknown.status, 404);

    let malformed = get(&api, "/api/render?taskId=nope").await;
    assert_eq!(malformed.status, 404);
    Ok(())
}

#[tokio::test]
async fn terminate_running_task_once() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let created = submit(&api, "blender -b scene.blend").await;
    let id = created["id"].as_str().unwrap().to_string();

    let resp = post(&api, "/api/render/terminate", json!({ "taskId": id })).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.json_body()?, json!({ "success": true }));

    let again = post(&api, "/api/render/terminate", json!({ "taskId": id })).await;
    assert_eq!(again.status, 404);
    assert_eq!(again.json_body()?["error"], "Failed to terminate task");

    let body = get(&api, &format!("/api/render?taskId={id}")).await.json_body()?;
    assert_eq!(body["status"], "failed");
    assert!(body["endTime"].is_string());

    let missing = post(&api, "/api/render/terminate", json!({})).await;
    assert_eq!(missing.status, 400);
    Ok(())
}

#[tokio::test]
async fn log_reports_progress() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let created = submit(&api, "blender -b scene.blend -s 1 -e 4").await;
    let id = created["id"].as_str().unwrap();
    let log_file = created["logFile"].as_str().unwrap();

    let mut text = std::fs::read_to_string(log_file)?;
    text.push_str("Fra:1 Mem:12M\nSaved: '/out/0001.png'\nFra:2 Mem:12M\n");
    std::fs::write(log_file, text)?;

    let report = get(&api, &format!("/api/render/log?taskId={id}")).await.json_body()?;
    assert_eq!(report["totalFrames"], 4);
    assert_eq!(report["completedFrames"], 1);
    assert_eq!(report["currentFrame"], 2);
    assert_eq!(report["progress"], 25.0);
    assert!(report["content"].as_str().unwrap().contains("Saved:"));

    let zero = get(&api, "/api/render/log?taskId=nope").await;
    assert_eq!(zero.status, 200);
    assert_eq!(zero.json_body()?["totalFrames"], 0);

    let missing = get(&api, "/api/render/log").await;
    assert_eq!(missing.status, 400);
    Ok(())
}

#[tokio::test]
async fn frames_images_and_video_check() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let created = submit(&api, "blender -b scene.blend").await;
    let id = created["id"].as_str().unwrap();
    let work_dir = PathBuf::from(created["workDir"].as_str().unwrap());

    let none = get(&api, &format!("/api/render/frames?taskId={id}")).await.json_body()?;
    assert_eq!(none, json!({ "frames": [] }));

    let output = work_dir.join("output");
    std::fs::create_dir_all(&output)?;
    std::fs::write(output.join("0002.jpg"), b"jpg")?;
    std::fs::write(output.join("0001.png"), b"png")?;

    let frames = get(&api, &format!("/api/render/frames?taskId={id}")).await.json_body()?;
    assert_eq!(frames, json!({ "frames": ["0001.png", "0002.jpg"] }));

    let image = get(&api, &format!("/api/render/image?taskId={id}&fileName=0002.jpg")).await;
    assert_eq!(image.status, 200);
    assert_eq!(image.content_type, "image/jpeg");
    assert_eq!(image.body_bytes(), Some(&b"jpg"[..]));

    let traversal = get(&api, &format!("/api/render/image?taskId={id}&fileName=..%2Fx.png")).await;
    assert_eq!(traversal.status, 400);

    let absent = get(&api, &format!("/api/render/image?taskId={id}&fileName=9.png")).await;
    assert_eq!(absent.status, 404);

    let no_name = get(&api, &format!("/api/render/image?taskId={id}")).await;
    assert_eq!(no_name.status, 400);

    let video = format!("/api/render/video/check?taskId={id}");
    assert_eq!(get(&api, &video).await.json_body()?, json!({ "exists": false }));
    std::fs::write(work_dir.join("output.mp4"), b"mp4")?;
    assert_eq!(get(&api, &video).await.json_body()?, json!({ "exists": true }));
    Ok(())
}

#[tokio::test]
async fn completed_task_is_visible_through_api() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let created = submit(&api, "blender -b scene.blend").await;
    let id = created["id"].as_str().unwrap().parse()?;

    api.fake.finish(id, TaskOutcome::Success).await;
    wait_for_status(&api.harness.manager, &id, TaskStatus::Completed).await;

    let body = get(&api, &format!("/api/render?taskId={id}")).await.json_body()?;
    assert_eq!(body["status"], "completed");
    Ok(())
}

#[tokio::test]
async fn unknown_routes_and_methods() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    assert_eq!(get(&api, "/api/nothing").await.status, 404);
    assert_eq!(get(&api, "/api/render/terminate").await.status, 405);

    let delete = api
        .router
        .handle(ApiRequest::new(Method::Other, "/api/render", Vec::new()))
        .await;
    assert_eq!(delete.status, 405);
    Ok(())
}

#[tokio::test]
async fn video_stream_serves_whole_file_or_range() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let created = submit(&api, "blender -b scene.blend").await;
    let id = created["id"].as_str().unwrap();
    let video_path = PathBuf::from(created["workDir"].as_str().unwrap()).join("output.mp4");
    let target = format!("/api/render/video/stream?taskId={id}");

    let missing = get(&api, &target).await;
    assert_eq!(missing.status, 404);

    std::fs::write(&video_path, vec![7u8; 1000])?;

    let full = get(&api, &target).await;
    assert_eq!(full.status, 200);
    assert_eq!(full.content_type, "video/mp4");
    assert_eq!(full.header("Accept-Ranges"), Some("bytes"));
    assert_eq!(
        full.body,
        ResponseBody::File {
            path: video_path.clone(),
            offset: 0,
            len: 1000
        }
    );

    let ranged = api
        .router
        .handle(ApiRequest::new(Method::Get, &target, Vec::new()).with_header("Range", "bytes=100-199"))
        .await;
    assert_eq!(ranged.status, 206);
    assert_eq!(ranged.header("content-range"), Some("bytes 100-199/1000"));
    assert_eq!(ranged.header("Accept-Ranges"), Some("bytes"));
    assert_eq!(
        ranged.body,
        ResponseBody::File {
            path: video_path.clone(),
            offset: 100,
            len: 100
        }
    );

    let open_ended = api
        .router
        .handle(ApiRequest::new(Method::Get, &target, Vec::new()).with_header("range", "bytes=900-"))
        .await;
    assert_eq!(open_ended.status, 206);
    assert_eq!(open_ended.header("Content-Range"), Some("bytes 900-999/1000"));

    let beyond = api
        .router
        .handle(ApiRequest::new(Method::Get, &target, Vec::new()).with_header("Range", "bytes=5000-"))
        .await;
    assert_eq!(beyond.status, 416);
    assert_eq!(beyond.header("Content-Range"), Some("bytes */1000"));

    let malformed = get(&api, "/api/render/video/stream?taskId=nope").await;
    assert_eq!(malformed.status, 404);
    let no_id = get(&api, "/api/render/video/stream").await;
    assert_eq!(no_id.status, 400);
    Ok(())
}

#[tokio::test]
async fn upload_is_stored_and_usable_in_a_command() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let resp = upload(&api, "/api/upload?fileName=scene.blend", b"BLENDER-v300").await;
    assert_eq!(resp.status, 200, "{:?}", resp.json_body());
    let body = resp.json_body()?;
    assert_eq!(body["message"], "File uploaded successfully");
    assert_eq!(body["fileName"], "scene.blend");

    let saved_as = body["savedAs"].as_str().unwrap();
    let (stamp, name) = saved_as.split_once('-').unwrap();
    assert!(stamp.parse::<i64>().is_ok());
    assert_eq!(name, "scene.blend");
    assert_eq!(body["path"], format!("/uploads/{saved_as}"));
    assert_eq!(std::fs::read(api.upload_dir.join(saved_as))?, b"BLENDER-v300");

    let task = submit(&api, &format!("blender -b {} -s 1 -e 2", body["path"].as_str().unwrap())).await;
    assert_eq!(api.fake.launches()[0].args[1], api.upload_dir.join(saved_as).display().to_string());
    assert_eq!(task["status"], "running");

    let second = upload(&api, "/api/upload?fileName=scene.blend", b"other").await.json_body()?;
    assert_ne!(second["savedAs"], body["savedAs"]);
    Ok(())
}

#[tokio::test]
async fn upload_rejects_missing_or_oversized_files() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    assert_eq!(upload(&api, "/api/upload", b"data").await.status, 400);
    assert_eq!(upload(&api, "/api/upload?fileName=scene.blend", b"").await.status, 400);
    assert_eq!(upload(&api, "/api/upload?fileName=..%2Fescape.blend", b"x").await.status, 400);
    assert!(!tmp.path().join("escape.blend").exists());

    let limited = api.router.clone().with_upload_limit(4);
    assert_eq!(limited.body_limit("/api/upload"), 4);
    let resp = limited
        .handle(ApiRequest::new(Method::Post, "/api/upload?fileName=big.blend", b"12345".to_vec()))
        .await;
    assert_eq!(resp.status, 400);
    assert!(resp.json_body()?["error"].as_str().unwrap().contains("4 byte"));

    assert_eq!(get(&api, "/api/upload").await.status, 405);
    Ok(())
}

#[tokio::test]
async fn outputs_are_served_for_tasks_from_an_earlier_run() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let api = api(tmp.path());

    let id = TaskId::generate();
    let work_dir = tasks_dir(tmp.path()).join(id.to_string());
    std::fs::create_dir_all(work_dir.join("output"))?;
    std::fs::write(work_dir.join("output").join("0001.png"), b"png")?;
    std::fs::write(work_dir.join("render.log"), "Args: [\"-s\",\"1\",\"-e\",\"4\"]\nSaved: a\n")?;
    std::fs::write(work_dir.join("output.mp4"), b"mp4")?;

    let frames = get(&api, &format!("/api/render/frames?taskId={id}")).await.json_body()?;
    assert_eq!(frames, json!({ "frames": ["0001.png"] }));

    let image = get(&api, &format!("/api/render/image?taskId={id}&fileName=0001.png")).await;
    assert_eq!(image.body_bytes(), Some(&b"png"[..]));

    let report = get(&api, &format!("/api/render/log?taskId={id}")).await.json_body()?;
    assert_eq!(report["progress"], 25.0);

    let check = get(&api, &format!("/api/render/video/check?taskId={id}")).await.json_body()?;
    assert_eq!(check, json!({ "exists": true }));
    assert_eq!(get(&api, &format!("/api/render/video/stream?taskId={id}")).await.status, 200);

    assert_eq!(get(&api, &format!("/api/render?taskId={id}")).await.status, 404);
    Ok(())
}
