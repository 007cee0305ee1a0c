use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::{contains, is_empty};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const UNREACHABLE_PROXY: &str = "http://127.0.0.1:9";

fn clean_env(cmd: &mut Command) {
    cmd.env_remove("LEGIS_PROXY_URL")
        .env_remove("LEGIS_API_URL")
        .env_remove("LEGIS_MODEL")
        .env_remove("LEGIS_PERSONA")
        .env_remove("LEGIS_TIMEOUT")
        .env_remove("LEGIS_API_TOKEN")
        .env_remove("RUST_LOG")
        .env("LEGIS_CONFIG", unique_temp_path("absent-config"));
}

fn legis_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("legis"));
    clean_env(&mut cmd);
    cmd
}

fn ask_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("legis-ask"));
    clean_env(&mut cmd);
    cmd
}

fn unique_temp_path(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("legis-test-{label}-{nanos}"))
}

fn write_config(label: &str, contents: &str) -> PathBuf {
    let path = unique_temp_path(label);
    fs::write(&path, contents).expect("config file should be writable");
    path
}

fn parse_stdout_json(output: &[u8]) -> Value {
    let text = String::from_utf8(output.to_vec()).expect("stdout should be utf-8");
    serde_json::from_str(text.trim()).expect("stdout should contain valid JSON")
}

fn last_user_content(body: &Value) -> &str {
    body["request"]["messages"]
        .as_array()
        .and_then(|messages| messages.last())
        .and_then(|message| message["content"].as_str())
        .expect("request should end with a user message")
}

#[test]
fn dry_run_prints_the_chat_request() {
    let assert = ask_cmd()
        .args(["--dry-run", "Quais projetos tratam de energia solar?"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["dry_run"], Value::Bool(true));
    assert_eq!(body["url"], "http://localhost:3000/api/chat");
    assert_eq!(body["persona"], "legislativo");
    assert_eq!(body["request"]["model"], "gpt-4o-mini");
    assert_eq!(body["request"]["messages"][0]["role"], "user");
    assert_eq!(
        last_user_content(&body),
        "Quais projetos tratam de energia solar?"
    );
    assert!(body["request"]["systemPrompt"].as_str().unwrap().contains("Legis AI"));

    let names: Vec<&str> = body["request"]["tools"]
        .as_array()
        .expect("tools should be offered by default")
        .iter()
        .map(|tool| tool["function"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["searchPropositions", "getPropositionDetails", "searchAuthors"]);
}

#[test]
fn argument_prompt_has_priority_over_stdin() {
    let assert = ask_cmd()
        .args(["--dry-run", "argument prompt"])
        .write_stdin("stdin prompt")
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(last_user_content(&body), "argument prompt");
}

#[test]
fn prompt_is_read_from_stdin() {
    let assert = legis_cmd()
        .args(["ask", "--dry-run"])
        .write_stdin("Resuma o PL 2630/2020\n")
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(last_user_content(&body), "Resuma o PL 2630/2020");
}

#[test]
fn missing_prompt_returns_explicit_error() {
    ask_cmd()
        .write_stdin("   ")
        .assert()
        .failure()
        .stderr(contains("No prompt provided. Pass it as an argument or via stdin."));
}

#[test]
fn no_tools_removes_tool_declarations() {
    let assert = ask_cmd()
        .args(["--no-tools", "--dry-run", "oi"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert!(body["request"].get("tools").is_none());
}

#[test]
fn persona_flag_selects_system_prompt() {
    let assert = ask_cmd()
        .args(["--persona", "politico", "--dry-run", "oi"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["persona"], "politico");
    assert!(body["request"]["systemPrompt"].as_str().unwrap().contains("analista político"));
}

#[test]
fn unknown_persona_returns_error() {
    ask_cmd()
        .args(["--persona", "astrologo", "--dry-run", "oi"])
        .assert()
        .failure()
        .stderr(contains(
            "Unknown persona 'astrologo'. Available: contabil, legislativo, politico.",
        ));
}

#[test]
fn configured_persona_is_available_without_profile() {
    let config_path = write_config(
        "persona",
        "[personas.fiscal]\nprompt = \"Você audita contratos públicos.\"\n",
    );

    let assert = ask_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["--persona", "fiscal", "--dry-run", "oi"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["request"]["systemPrompt"], "Você audita contratos públicos.");
}

#[test]
fn unsupported_attachment_is_rejected() {
    let path = unique_temp_path("notes").with_extension("txt");
    fs::write(&path, "texto").expect("attachment should be writable");

    ask_cmd()
        .arg("--file")
        .arg(&path)
        .args(["--dry-run", "leia"])
        .assert()
        .failure()
        .stderr(contains("unsupported attachment type"));
}

#[test]
fn attachment_is_sent_as_base64_file() {
    let path = unique_temp_path("pauta").with_extension("pdf");
    fs::write(&path, b"%PDF-1.4").expect("attachment should be writable");

    let assert = ask_cmd()
        .arg("--file")
        .arg(&path)
        .arg("--dry-run")
        .write_stdin("")
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    let file = &body["request"]["files"][0];
    assert_eq!(file["mimeType"], "application/pdf");
    assert_eq!(file["data"], "JVBERi0xLjQ=");
}

#[test]
fn profile_loads_urls_and_model_for_dry_run() {
    let config_path = write_config(
        "profile",
        "[profiles.prod]\nproxy_url = \"https://legis.example\"\nmodel = \"gpt-4o\"\npersona = \"contabil\"\n",
    );

    let assert = ask_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["--profile", "prod", "--dry-run", "oi"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["url"], "https://legis.example/api/chat");
    assert_eq!(body["persona"], "contabil");
    assert_eq!(body["request"]["model"], "gpt-4o");
}

#[test]
fn profile_is_not_implicit_when_not_passed() {
    let config_path = write_config("implicit", "[profiles.default]\nmodel = \"gpt-4o\"\n");

    let assert = ask_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["--dry-run", "oi"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["request"]["model"], "gpt-4o-mini");
}

#[test]
fn profile_env_and_cli_precedence_is_respected() {
    let config_path = write_config("precedence", "[profiles.p]\nmodel = \"profile-model\"\n");

    let from_profile = ask_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["--profile", "p", "--dry-run", "oi"])
        .assert()
        .success();
    let body = parse_stdout_json(&from_profile.get_output().stdout);
    assert_eq!(body["request"]["model"], "profile-model");

    let from_env = ask_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .env("LEGIS_MODEL", "env-model")
        .args(["--profile", "p", "--dry-run", "oi"])
        .assert()
        .success();
    let body = parse_stdout_json(&from_env.get_output().stdout);
    assert_eq!(body["request"]["model"], "env-model");

    let from_cli = ask_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .env("LEGIS_MODEL", "env-model")
        .args(["--profile", "p", "--model", "cli-model", "--dry-run", "oi"])
        .assert()
        .success();
    let body = parse_stdout_json(&from_cli.get_output().stdout);
    assert_eq!(body["request"]["model"], "cli-model");
}

#[test]
fn profile_file_missing_returns_explicit_error() {
    ask_cmd()
        .args(["--profile", "prod", "--dry-run", "oi"])
        .assert()
        .failure()
        .stderr(contains("Failed to read config file"));
}

#[test]
fn invalid_profile_toml_returns_parse_error() {
    let config_path = write_config("bad-toml", "[profiles.bad\nmodel = \"x\"");

    ask_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["--profile", "bad", "--dry-run", "oi"])
        .assert()
        .failure()
        .stderr(contains("Failed to parse config file"));
}

#[test]
fn profile_not_found_returns_error() {
    let config_path = write_config("not-found", "[profiles.prod]\nmodel = \"x\"\n");

    ask_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["--profile", "dev", "--dry-run", "oi"])
        .assert()
        .failure()
        .stderr(contains("Profile 'dev' not found"));
}

#[test]
fn invalid_env_timeout_returns_error() {
    ask_cmd()
        .env("LEGIS_TIMEOUT", "soon")
        .args(["--dry-run", "oi"])
        .assert()
        .failure()
        .stderr(contains("Invalid LEGIS_TIMEOUT 'soon'. Expected seconds."));
}

#[test]
fn verbose_does_not_leak_api_token() {
    ask_cmd()
        .env("LEGIS_API_TOKEN", "super-secret-token")
        .args(["--verbose", "--dry-run", "oi"])
        .assert()
        .success()
        .stderr(contains("token_present=true").and(contains("super-secret-token").not()));
}

#[test]
fn quiet_suppresses_verbose_logs_on_stderr() {
    ask_cmd()
        .args(["--quiet", "--verbose", "--dry-run", "oi"])
        .assert()
        .success()
        .stderr(is_empty());
}

#[test]
fn quiet_keeps_fatal_errors_visible() {
    ask_cmd()
        .args(["--quiet", "--persona", "astrologo", "oi"])
        .assert()
        .failure()
        .stderr(contains("Unknown persona 'astrologo'"));
}

#[test]
fn unreachable_proxy_shows_apology_and_fails() {
    ask_cmd()
        .args(["--proxy-url", UNREACHABLE_PROXY, "--no-save", "--quiet", "oi"])
        .assert()
        .failure()
        .stdout(contains("Desculpe, ocorreu um erro ao processar sua mensagem."))
        .stderr(contains("chat proxy request failed"));
}

#[test]
fn json_output_reports_failed_turn() {
    let assert = ask_cmd()
        .args(["--proxy-url", UNREACHABLE_PROXY, "--no-save", "--json", "oi"])
        .assert()
        .failure();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["chat_id"], Value::Null);
}

#[test]
fn version_prints_build_metadata() {
    legis_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("commit:").and(contains("built:")));
}

#[test]
fn legis_ask_version_prints_metadata() {
    legis_cmd()
        .args(["ask", "--version"])
        .assert()
        .success()
        .stdout(contains("commit:").and(contains("built:")));
}

#[test]
fn legis_ask_help_includes_examples() {
    legis_cmd()
        .args(["ask", "--help"])
        .assert()
        .success()
        .stdout(contains("Examples:").and(contains("legis ask --file pauta.pdf")));
}

#[test]
fn legis_help_mentions_commands() {
    legis_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            contains("chat")
                .and(contains("tools"))
                .and(contains("Generate shell completion script")),
        );
}

#[test]
fn tools_names_lists_registered_tools() {
    legis_cmd()
        .args(["tools", "--names"])
        .assert()
        .success()
        .stdout(
            contains("searchPropositions")
                .and(contains("getPropositionDetails"))
                .and(contains("searchAuthors")),
        );
}

#[test]
fn tools_prints_schemas_as_json() {
    let assert = legis_cmd().arg("tools").assert().success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    let tools = body.as_array().expect("schemas should be an array");
    assert_eq!(tools.len(), 3);
    assert!(tools.iter().all(|tool| tool["type"] == "function"));
    assert_eq!(tools[0]["function"]["parameters"]["required"][0], "searchParam");
}

#[test]
fn config_check_accepts_valid_file() {
    let config_path = write_config(
        "check-ok",
        "[profiles.prod]\nproxy_url = \"https://legis.example\"\npersona = \"politico\"\n",
    );

    legis_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(contains("config OK"));
}

#[test]
fn config_check_rejects_unknown_persona() {
    let config_path = write_config("check-persona", "[profiles.prod]\npersona = \"astrologo\"\n");

    legis_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["config", "check", "--profile", "prod"])
        .assert()
        .failure()
        .stderr(contains("Invalid profile persona 'astrologo' in profile 'prod'."));
}

#[test]
fn config_check_rejects_non_http_url() {
    let config_path = write_config("check-url", "[profiles.prod]\napi_url = \"ftp://legis\"\n");

    legis_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(contains("Invalid profile api_url 'ftp://legis'"));
}

#[test]
fn config_personas_lists_builtin_and_configured() {
    let config_path = write_config("personas", "[personas.fiscal]\nprompt = \"x\"\n");

    legis_cmd()
        .env("LEGIS_CONFIG", &config_path)
        .args(["config", "personas"])
        .assert()
        .success()
        .stdout(
            contains("legislativo (default)")
                .and(contains("fiscal (config)"))
                .and(contains("contabil")),
        );
}

#[test]
fn chat_quits_on_command() {
    legis_cmd()
        .args(["chat", "--quiet", "--no-save"])
        .write_stdin("/history\n/quit\n")
        .assert()
        .success();
}

#[test]
fn chat_ends_on_eof() {
    legis_cmd()
        .args(["chat", "--quiet"])
        .write_stdin("")
        .assert()
        .success();
}

#[test]
fn legis_completion_bash_outputs_script() {
    legis_cmd()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(contains("_legis"));
}

#[test]
fn legis_completion_fish_outputs_script() {
    legis_cmd()
        .args(["completion", "fish"])
        .assert()
        .success()
        .stdout(contains("complete -c legis"));
}
