use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Output;

use link_audit::models::{read_rows, read_summary, write_rows, Escalation, Phase, ShardStatus};
use link_audit::orchestrator::{ShardCoordinator, WorkerCommand};
use link_audit::{Config, StatusVerdict, UrlEntry, UrlRecord};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// 本地假站点：按路径返回固定响应，未知路径返回 404
async fn serve() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let target = request.split_whitespace().nth(1).unwrap_or("/");
                let path = target.split('?').next().unwrap_or("/");
                let (status, body) = match path {
                    "/paper" => ("200 OK", "<p>论文全文下载</p>"),
                    "/removed" => ("200 OK", "<p>您访问的页面不存在或已被删除</p>"),
                    "/blocked" => ("403 Forbidden", "forbidden"),
                    _ => ("404 Not Found", "not found"),
                };
                let raw = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(raw.as_bytes()).await;
            });
        }
    });
    (addr, handle)
}

/// 一个肯定连不上的地址
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
    input: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn new(entries: &[UrlEntry]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let input = root.join("links.csv");
        write_rows(&input, entries).unwrap();

        // 浏览器一定启动失败，安装命令也失败：可疑行会被标记为未复查
        let config = Config {
            worker_count: 3,
            request_timeout_seconds: 5,
            render_settle_seconds: 0,
            work_dir: root.join("work"),
            output_dir: root.join("out"),
            browser_executable: Some(root.join("no-such-chrome")),
            driver_dir: root.join("driver"),
            driver_install_command: vec![root.join("no-such-installer").display().to_string()],
            ..Config::default()
        };
        let config_path = root.join("link-audit.toml");
        config.write_to(&config_path).unwrap();

        Self {
            _dir: dir,
            root,
            input,
            config: config_path,
        }
    }

    async fn run(&self, extra: &[&str]) -> Output {
        tokio::process::Command::new(env!("CARGO_BIN_EXE_link-audit"))
            .arg("run")
            .arg("--input")
            .arg(&self.input)
            .arg("--config")
            .arg(&self.config)
            .args(extra)
            .output()
            .await
            .unwrap()
    }

    fn round(&self, n: u8) -> PathBuf {
        self.root.join("out").join(format!("checked_round_{}.csv", n))
    }

    fn phase_dir(&self, n: u8) -> PathBuf {
        self.root.join("work").join(format!("phase-{}", n))
    }
}

fn records(path: &Path) -> Vec<UrlRecord> {
    read_rows(path).unwrap()
}

#[tokio::test]
async fn test_two_rounds_end_to_end() {
    let (addr, _server) = serve().await;
    let dead = closed_port().await;
    let entries = vec![
        UrlEntry::new("CNKI", format!("http://{}/paper", addr)),
        UrlEntry::new("CNKI", format!("http://{}/removed", addr)),
        UrlEntry::new("Wanfang", format!("http://{}/missing", addr)),
        UrlEntry::new("Wanfang", format!("http://{}/blocked", addr)),
        UrlEntry::new("VIP", format!("http://{}/paper", dead)),
    ];
    let workspace = Workspace::new(&entries);

    let output = workspace.run(&[]).await;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // 第一轮：输入顺序，分片 [0..2, 2..4, 4..5]
    let round_1 = records(&workspace.round(1));
    let got: Vec<_> = round_1
        .iter()
        .map(|r| (r.url.as_str(), r.status, r.shard_index))
        .collect();
    assert_eq!(
        got,
        vec![
            (entries[0].url.as_str(), StatusVerdict::Ok, 0),
            (entries[1].url.as_str(), StatusVerdict::NotFound, 0),
            (entries[2].url.as_str(), StatusVerdict::HttpError(404), 1),
            (entries[3].url.as_str(), StatusVerdict::HttpError(403), 1),
            (entries[4].url.as_str(), StatusVerdict::Unreachable, 2),
        ]
    );

    // 第二轮：只有 403 那一行需要复查，浏览器起不来，保留第一轮结果
    let round_2 = records(&workspace.round(2));
    assert_eq!(round_2.len(), round_1.len());
    for (before, after) in round_1.iter().zip(&round_2) {
        if before.status == StatusVerdict::HttpError(403) {
            assert_eq!(after.status, before.status);
            assert_eq!(after.escalation, Some(Escalation::Unresolved));
        } else {
            assert_eq!(after, before);
        }
    }

    let raw = std::fs::read_to_string(workspace.round(2)).unwrap();
    assert!(raw.contains("webpage unavailable"));

    let degraded = read_summary(&workspace.phase_dir(2).join("shard-1.summary.json"))
        .unwrap()
        .unwrap();
    assert_eq!(degraded.status, ShardStatus::Degraded);
    assert_eq!(degraded.unresolved, 1);
    let clean = read_summary(&workspace.phase_dir(2).join("shard-0.summary.json"))
        .unwrap()
        .unwrap();
    assert_eq!(clean.status, ShardStatus::Completed);
}

#[tokio::test]
async fn test_more_workers_than_rows() {
    let (addr, _server) = serve().await;
    let entries = vec![UrlEntry::new("CNKI", format!("http://{}/paper", addr))];
    let workspace = Workspace::new(&entries);

    let output = workspace.run(&["--workers", "4"]).await;
    assert!(output.status.success());

    let round_2 = records(&workspace.round(2));
    assert_eq!(round_2.len(), 1);
    assert_eq!(round_2[0].status, StatusVerdict::Ok);
    // 空分片也留下了输出和完成标记
    for shard in 0..4 {
        assert!(workspace
            .phase_dir(1)
            .join(format!("shard-{}.summary.json", shard))
            .exists());
    }
}

#[tokio::test]
async fn test_resume_reuses_finished_shards() {
    let (addr, server) = serve().await;
    let entries: Vec<UrlEntry> = (0..6)
        .map(|i| UrlEntry::new("CNKI", format!("http://{}/paper?id={}", addr, i)))
        .collect();
    let workspace = Workspace::new(&entries);

    assert!(workspace.run(&[]).await.status.success());
    let first = records(&workspace.round(2));
    assert!(first.iter().all(|r| r.status == StatusVerdict::Ok));

    // 站点下线后续跑：分片都已完成，不会重新请求
    server.abort();
    let _ = server.await;
    assert!(workspace.run(&["--resume"]).await.status.success());
    assert_eq!(records(&workspace.round(2)), first);

    // 不续跑则重新请求，全部连不上
    assert!(workspace.run(&[]).await.status.success());
    assert!(records(&workspace.round(2))
        .iter()
        .all(|r| r.status == StatusVerdict::Unreachable));
}

#[tokio::test]
async fn test_resume_after_crashed_lightweight_shard() {
    let (addr, _server) = serve().await;
    let entries: Vec<UrlEntry> = (0..10)
        .map(|i| UrlEntry::new("CNKI", format!("http://{}/paper?id={}", addr, i)))
        .collect();
    let workspace = Workspace::new(&entries);
    assert!(workspace.run(&["--workers", "5"]).await.status.success());

    // 还原"第一轮分片 0 崩溃"之后的现场：分片 0 没有完成标记，
    // 第二轮只处理了其余 8 行
    std::fs::remove_file(workspace.phase_dir(1).join("shard-0.summary.json")).unwrap();
    let round_1 = records(&workspace.round(1));
    let work_dir = workspace.root.join("work");
    let coordinator = ShardCoordinator::new(
        WorkerCommand::new(env!("CARGO_BIN_EXE_link-audit"), work_dir.join("config.toml")),
        &work_dir,
        5,
    );
    let partial = coordinator
        .run_phase(Phase::Escalation, &round_1[2..], |rows| rows)
        .await
        .unwrap();
    assert_eq!(partial.records.len(), 8);

    assert!(workspace
        .run(&["--workers", "5", "--resume"])
        .await
        .status
        .success());

    let round_2 = records(&workspace.round(2));
    let urls: Vec<&str> = round_2.iter().map(|r| r.url.as_str()).collect();
    let expected: Vec<&str> = entries.iter().map(|e| e.url.as_str()).collect();
    assert_eq!(urls, expected);
}

#[tokio::test]
async fn test_missing_input_fails() {
    let workspace = Workspace::new(&[]);
    std::fs::remove_file(&workspace.input).unwrap();
    let output = workspace.run(&[]).await;
    assert!(!output.status.success());
}

/// 需要本机安装 Chrome/Chromium：cargo test -- --ignored
#[tokio::test]
#[ignore]
async fn test_blocked_page_rendered_in_browser_becomes_ok() {
    let (addr, _server) = serve().await;
    let entries = vec![UrlEntry::new("CNKI", format!("http://{}/blocked", addr))];
    let workspace = Workspace::new(&entries);

    // 换成使用本机浏览器的配置
    let config = Config {
        worker_count: 1,
        render_settle_seconds: 1,
        work_dir: workspace.root.join("work"),
        output_dir: workspace.root.join("out"),
        ..Config::default()
    };
    config.write_to(&workspace.config).unwrap();

    assert!(workspace.run(&[]).await.status.success());
    let round_2 = records(&workspace.round(2));
    // 403 页面本身没有删除提示
    assert_eq!(round_2[0].status, StatusVerdict::Ok);
    assert_eq!(round_2[0].escalation, Some(Escalation::Rendered));
}
