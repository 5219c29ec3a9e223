use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn basket_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("basket");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("catalog.csv"),
        "asin,name,category,price,keywords,is_prime\n\
         B001E5E3KG,Gold Medal All-Purpose Flour,baking,4.99,flour;all-purpose,true\n\
         B00I8G8AKO,Cane Sugar,baking,3.49,sugar,false\n\
         not-an-asin,Broken Row,baking,1.00,,false\n",
    )
    .unwrap();

    fs::write(
        root.join("list.json"),
        r#"[
  {"name": "organic spinach", "quantity": 1, "unit": "bag"},
  {"name": "all-purpose flour", "quantity": "2", "unit": "cups", "source_recipe_id": "r1"},
  {"name": "chicken breast", "quantity": 1.5, "unit": "lb"},
  {"name": "sugar", "quantity": "1/2", "unit": "cup"},
  {"name": "kosher salt", "quantity": "1", "unit": "tsp"}
]"#,
    )
    .unwrap();
    fs::write(root.join("empty.json"), "[]").unwrap();

    // The key variable is never set, so quick delivery always uses the storefront link
    let config_content = format!(
        r#"[db]
path = "{}/data/basket.sqlite"

[server]
bind = "127.0.0.1:7349"

[quick_delivery]
api_key_env = "BASKET_ROUTER_TEST_KEY_NEVER_SET"
"#,
        root.display()
    );

    let config_path = config_dir.join("basket.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_basket(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = basket_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run basket binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn root_of(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().to_path_buf()
}

fn path_arg(config_path: &Path, name: &str) -> String {
    root_of(config_path).join(name).to_str().unwrap().to_string()
}

fn seeded_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_basket(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let csv = path_arg(&config_path, "catalog.csv");
    let (_, stderr, success) = run_basket(&config_path, &["import", &csv]);
    assert!(success, "import failed: {}", stderr);
    (tmp, config_path)
}

fn names(group: &serde_json::Value) -> Vec<String> {
    group
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_basket(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(root_of(&config_path).join("data/basket.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_basket(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_basket(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_classify_without_config() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (stdout, stderr, success) = run_basket(&missing, &["classify", "Organic Spinach"]);
    assert!(success, "classify failed: {}", stderr);
    assert!(stdout.contains("category=fresh_produce"));
    assert!(stdout.contains("service=quick_delivery"));
    assert!(stdout.contains("freshness=10"));
}

#[test]
fn test_import_reports_failures() {
    let (_tmp, config_path) = setup_test_env();
    run_basket(&config_path, &["init"]);

    let csv = path_arg(&config_path, "catalog.csv");
    let (stdout, stderr, success) = run_basket(&config_path, &["import", &csv]);
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("Imported 2 products, 1 failed."));
    assert!(stdout.contains("not-an-asin"));

    // Re-importing rejects every valid row as a duplicate
    let (stdout, _, success) = run_basket(&config_path, &["import", &csv]);
    assert!(success);
    assert!(stdout.contains("Imported 0 products, 3 failed."));
    assert!(stdout.contains("Duplicate ASIN: B001E5E3KG"));
}

#[test]
fn test_search() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, _, success) = run_basket(&config_path, &["search", "flour"]);
    assert!(success);
    assert!(stdout.contains("Gold Medal All-Purpose Flour"));
    assert!(stdout.contains("B001E5E3KG"));
    assert!(!stdout.contains("Cane Sugar"));

    let (stdout, _, success) =
        run_basket(&config_path, &["search", "flour", "--category", "produce"]);
    assert!(success);
    assert!(stdout.contains("No products found."));
}

#[test]
fn test_route_json() {
    let (_tmp, config_path) = seeded_env();
    let list = path_arg(&config_path, "list.json");

    let (stdout, stderr, success) =
        run_basket(&config_path, &["route", &list, "--user", "u1", "--json"]);
    assert!(success, "route failed: {}", stderr);

    let plan: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        names(&plan["quick_delivery_items"]),
        vec!["organic spinach", "chicken breast"]
    );
    assert_eq!(
        names(&plan["marketplace_items"]),
        vec!["all-purpose flour", "sugar", "kosher salt"]
    );
    assert!(plan["manual_items"].as_array().unwrap().is_empty());
    assert_eq!(plan["quick_delivery_items"][0]["reasoning"], "auto-categorized");
    assert_eq!(plan["quick_delivery_items"][0]["confidence_score"], 0.7);
}

#[test]
fn test_route_empty_list_fails() {
    let (_tmp, config_path) = seeded_env();
    let empty = path_arg(&config_path, "empty.json");

    let (_, stderr, success) = run_basket(&config_path, &["route", &empty, "--user", "u1"]);
    assert!(!success);
    assert!(stderr.contains("grocery list is empty"));
}

#[test]
fn test_rule_overrides_classifier() {
    let (_tmp, config_path) = seeded_env();
    let list = path_arg(&config_path, "list.json");

    let (stdout, stderr, success) = run_basket(
        &config_path,
        &[
            "rule",
            "Kosher Salt",
            "--category",
            "pantry",
            "--service",
            "manual",
        ],
    );
    assert!(success, "rule failed: {}", stderr);
    assert!(stdout.contains("kosher salt"));

    let (stdout, _, _) = run_basket(&config_path, &["route", &list, "--user", "u1", "--json"]);
    let plan: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(names(&plan["manual_items"]), vec!["kosher salt"]);
    assert_eq!(plan["manual_items"][0]["reasoning"], "rule match");
    assert_eq!(plan["manual_items"][0]["confidence_score"], 1.0);

    let (_, stderr, success) = run_basket(
        &config_path,
        &[
            "rule",
            "salt",
            "--category",
            "pantry",
            "--service",
            "manual",
            "--freshness",
            "11",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("freshness"));
}

#[test]
fn test_map_validates_identifier() {
    let (_tmp, config_path) = seeded_env();

    let (_, stderr, success) = run_basket(&config_path, &["map", "flour", "b001e5e3kg"]);
    assert!(!success);
    assert!(stderr.contains("invalid marketplace identifier"));

    let (_, stderr, success) = run_basket(&config_path, &["map", "flour", "B000000000"]);
    assert!(!success);
    assert!(stderr.contains("No product"));

    let (stdout, stderr, success) = run_basket(
        &config_path,
        &["map", "all-purpose flour", "B001E5E3KG", "--confidence", "0.9"],
    );
    assert!(success, "map failed: {}", stderr);
    assert!(stdout.contains("Gold Medal All-Purpose Flour"));
}

#[test]
fn test_checkout_end_to_end() {
    let (_tmp, config_path) = seeded_env();
    let list = path_arg(&config_path, "list.json");

    let (stdout, stderr, success) =
        run_basket(&config_path, &["checkout", &list, "--user", "u1", "--json"]);
    assert!(success, "checkout failed: {}", stderr);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    let quick = &summary["quick_delivery"];
    assert_eq!(quick["source"], "fallback");
    assert!(quick["url"].as_str().unwrap().contains("tag=mealscrape-20"));

    let marketplace = &summary["marketplace"];
    let cart_url = marketplace["cart_url"].as_str().unwrap();
    assert!(cart_url.contains("ItemId.1=B001E5E3KG&Quantity.1=2"));
    assert!(cart_url.contains("ItemId.2=B00I8G8AKO&Quantity.2=1"));
    assert!(cart_url.contains("tag=mealscrape-20"));
    assert_eq!(marketplace["has_unmapped_items"], true);
    assert_eq!(marketplace["unmapped_items"][0]["ingredient"], "kosher salt");
    assert_eq!(marketplace["cart"]["inserted"], 2);
    assert_eq!(marketplace["cart"]["failed"], 0);
    assert!(summary.get("manual").is_none());

    let (stdout, _, success) = run_basket(&config_path, &["cart", "--user", "u1"]);
    assert!(success);
    assert!(stdout.contains("Gold Medal All-Purpose Flour"));
    assert!(stdout.contains("Cane Sugar"));
    assert!(stdout.contains("marketplace"));

    let (stdout, _, _) = run_basket(&config_path, &["cart", "--user", "someone-else"]);
    assert!(stdout.contains("Cart is empty."));

    // Selected products gain popularity
    let (stdout, _, _) = run_basket(&config_path, &["search", "sugar"]);
    assert!(stdout.contains("popularity 1"));
}

#[test]
fn test_prefs_opt_out_moves_items_to_manual() {
    let (_tmp, config_path) = seeded_env();
    let list = path_arg(&config_path, "list.json");

    let (stdout, _, success) = run_basket(&config_path, &["prefs", "show", "--user", "u2"]);
    assert!(success);
    let prefs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(prefs["default_service"], "auto");
    assert_eq!(prefs["auto_route_pantry_items"], true);

    let (_, stderr, success) = run_basket(
        &config_path,
        &[
            "prefs",
            "set",
            "--user",
            "u2",
            "--auto-route-pantry",
            "false",
            "--street",
            "1 Main St",
            "--city",
            "Springfield",
            "--state",
            "IL",
            "--zip",
            "62701",
        ],
    );
    assert!(success, "prefs set failed: {}", stderr);

    let (stdout, _, _) = run_basket(&config_path, &["prefs", "show", "--user", "u2"]);
    let prefs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(prefs["auto_route_pantry_items"], false);
    assert_eq!(prefs["delivery_address"]["city"], "Springfield");

    let (stdout, _, _) = run_basket(&config_path, &["route", &list, "--user", "u2", "--json"]);
    let plan: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        names(&plan["manual_items"]),
        vec!["all-purpose flour", "sugar", "kosher salt"]
    );
    assert_eq!(
        names(&plan["quick_delivery_items"]),
        vec!["organic spinach", "chicken breast"]
    );
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_basket(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
