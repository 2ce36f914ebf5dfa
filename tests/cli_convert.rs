mod common;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use common::{Epub, PIXEL_PNG, STORY_ID};
use predicates::prelude::*;

fn spawn_story_server() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let addr = server.server_addr();
    let base_url = format!("http://{addr}");

    let api_json = common::story_json(&base_url, &[(1, "The Kettle"), (2, "The Cups")]);
    let chapter_one = common::chapter_html(
        "The Kettle",
        r#"<div class="authors-note">First story!</div><p>Steam rose &amp; curled.<br></p>"#,
    );
    let chapter_two = common::chapter_html(
        "The Cups",
        &format!(r#"<p>They clinked.</p><p><img src="{base_url}/images/pixel.png"></p>"#),
    );
    let story_page = r#"<html><body>
<span class="description-text bbcode"><p>Tea, <b>friends</b> and cake.</p></span>
<ul class="story-tags">
<li><a class="tag-genre" href="/tag/slice-of-life">Slice of Life</a></li>
<li><a class="tag-character" href="/tag/twilight">Twilight Sparkle</a></li>
</ul>
<div class="sidebar"><a class="tag-series" href="/tag/elsewhere">Elsewhere</a></div>
<span class="approved-date"><span data-time="1500000000">12th Jul 2017</span></span>
</body></html>"#
        .to_owned();

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let url = request.url().to_string();
            let (status, body, content_type): (u16, Vec<u8>, &str) = match url.as_str() {
                u if u == format!("/api/story.php?story={STORY_ID}") => {
                    (200, api_json.clone().into_bytes(), "application/json")
                }
                u if u == format!("/story/{STORY_ID}") => {
                    (200, story_page.clone().into_bytes(), "text/html; charset=utf-8")
                }
                "/chapters/download/1/html" => {
                    (200, chapter_one.clone().into_bytes(), "text/html; charset=utf-8")
                }
                "/chapters/download/2/html" => {
                    (200, chapter_two.clone().into_bytes(), "text/html; charset=utf-8")
                }
                "/images/cover-full.png" | "/images/pixel.png" => {
                    (200, PIXEL_PNG.to_vec(), "image/png")
                }
                _ => (404, b"not found".to_vec(), "text/plain"),
            };

            let header =
                tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                    .expect("build header");
            let response = tiny_http::Response::from_data(body)
                .with_status_code(status)
                .with_header(header);
            let _ = request.respond(response);
        }
    });

    (base_url, shutdown_tx, handle)
}

fn convert_cmd(base_url: &str) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ficbinder");
    cmd.env_remove("FICBINDER_YOUTUBE_API_KEY")
        .args(["convert", "--base-url", base_url, "--concurrency", "2"]);
    cmd
}

#[test]
fn convert_writes_a_complete_epub() -> anyhow::Result<()> {
    let (base_url, shutdown_tx, server_handle) = spawn_story_server();
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("tea.epub");

    convert_cmd(&base_url)
        .args([
            "--story",
            &format!("{base_url}/story/{STORY_ID}/tea-with-friends"),
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("tea.epub"));

    let mut epub = Epub::open(std::fs::read(&out)?);
    assert_eq!(epub.names()[0], "mimetype");
    assert_eq!(epub.text("mimetype"), "application/epub+zip");
    assert!(epub.has("OEBPS/Text/cover.xhtml"));
    assert!(epub.has("OEBPS/Images/cover.png"));
    assert!(epub.has("OEBPS/Images/ext_1.png"));

    let opf = epub.text("OEBPS/content.opf");
    assert!(opf.contains("<dc:title>Tea With Friends</dc:title>"));
    assert!(opf.contains("Quill"));

    let title = epub.text("OEBPS/Text/title.xhtml");
    assert!(title.contains("<b>friends</b>"));
    assert!(title.contains("Twilight Sparkle"));
    assert!(!title.contains("Elsewhere"));

    let first = epub.text("OEBPS/Text/chapter_1.xhtml");
    assert!(first.contains("First story!"));
    assert!(first.contains("Steam rose &amp; curled.<br />"));

    let second = epub.text("OEBPS/Text/chapter_2.xhtml");
    assert!(second.contains(r#"src="../Images/ext_1.png""#));

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
    Ok(())
}

#[test]
fn convert_names_the_file_after_the_title_and_refuses_to_overwrite() -> anyhow::Result<()> {
    let (base_url, shutdown_tx, server_handle) = spawn_story_server();
    let temp = tempfile::TempDir::new()?;
    let out_dir = temp.path().to_str().unwrap().to_owned();
    let story = STORY_ID.to_string();

    convert_cmd(&base_url)
        .args(["--story", &story, "--out", &out_dir, "--title", "Tea: Part Two"])
        .assert()
        .success();
    let expected = temp.path().join("Tea_ Part Two.epub");
    assert!(expected.is_file());

    convert_cmd(&base_url)
        .args(["--story", &story, "--out", &out_dir, "--title", "Tea: Part Two"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    convert_cmd(&base_url)
        .args([
            "--story",
            &story,
            "--out",
            &out_dir,
            "--title",
            "Tea: Part Two",
            "--force",
        ])
        .assert()
        .success();

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
    Ok(())
}

#[test]
fn unknown_story_fails_with_the_stage_named() {
    let (base_url, shutdown_tx, server_handle) = spawn_story_server();
    let temp = tempfile::TempDir::new().expect("tempdir");
    let out = temp.path().join("missing.epub");

    convert_cmd(&base_url)
        .args(["--story", "999", "--out", out.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fetching-metadata failed"));
    assert!(!out.exists());

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();
}

#[test]
fn rust_log_debug_emits_parsed_cli_to_stderr() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ficbinder");
    cmd.env("RUST_LOG", "debug")
        .args(["convert", "--story", "not a story", "--out", "x.epub"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsed cli"));
}
