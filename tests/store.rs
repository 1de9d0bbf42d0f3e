use std::fs;

use camino::Utf8PathBuf;
use chrono::NaiveDate;

use kira_codon_usage::domain::{GeneRef, Kingdom, Organism, ProkaryoteGroup, RepliconType};
use kira_codon_usage::stats::{Gene, summarize};
use kira_codon_usage::store::{JsonStore, OrganismRecord, ResultStore};

fn record(name: &str, group: &str, kingdom: Kingdom) -> OrganismRecord {
    let mut organism = Organism {
        name: name.to_string(),
        bio_project: None,
        group: group.to_string(),
        sub_group: "Sub".to_string(),
        updated: None,
        kingdom,
        path: None,
        prokaryote_group: ProkaryoteGroup::from_group_name(group),
        genes: vec![GeneRef::new("NC_000001", RepliconType::Chromosome)],
    };
    organism.path = Some(organism.default_path());

    let mut gene = Gene::new("NC_000001", RepliconType::Chromosome, organism.path.clone());
    gene.stats.record_accepted();
    gene.stats.count_sequence(b"ATGGCATAA");
    gene.stats.normalize();
    let sums = summarize(organism.path.clone(), std::slice::from_ref(&gene));
    OrganismRecord::new(organism, vec![gene], Vec::new(), sums)
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, root)
}

#[test]
fn save_writes_one_document_per_organism() {
    let (_dir, root) = temp_root();
    let store = JsonStore::new(root.clone());
    let record = record("Bacillus subtilis", "Firmicutes", Kingdom::Bacteria);
    store.save(&record).unwrap();

    let path = store.record_path(&record);
    assert!(path.starts_with(&root));
    assert!(path.ends_with("Bacteria/Firmicutes/Sub/Bacillus subtilis/Bacillus subtilis.json"));

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path.as_std_path()).unwrap()).unwrap();
    assert_eq!(value["organism"]["name"], "Bacillus subtilis");
    assert_eq!(value["genes"][0]["accession"], "NC_000001");
    assert_eq!(value["sums"][0]["gene_count"], 1);
    assert_eq!(value["sums"][0]["total_cds"], 1);
    assert!(!path.with_extension("json.tmp").as_std_path().exists());
}

#[test]
fn update_date_is_stored_as_iso_date() {
    let (_dir, root) = temp_root();
    let store = JsonStore::new(root);
    let mut record = record("Escherichia coli", "Proteobacteria", Kingdom::Bacteria);
    record.organism.updated = NaiveDate::from_ymd_opt(2016, 3, 7);
    store.save(&record).unwrap();

    let path = store.record_path(&record);
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path.as_std_path()).unwrap()).unwrap();
    assert_eq!(value["organism"]["updated"], "2016-03-07");
    assert_eq!(value["organism"]["kingdom"], "bacteria");
}

#[test]
fn saving_twice_overwrites() {
    let (_dir, root) = temp_root();
    let store = JsonStore::new(root);
    let record = record("Bacillus subtilis", "Firmicutes", Kingdom::Bacteria);
    store.save(&record).unwrap();
    store.save(&record).unwrap();
    assert_eq!(store.tree(Kingdom::Bacteria).unwrap().file_count(), 1);
}

#[test]
fn tree_is_sorted() {
    let (_dir, root) = temp_root();
    let store = JsonStore::new(root);
    store
        .save(&record("Zymomonas mobilis", "Proteobacteria", Kingdom::Bacteria))
        .unwrap();
    store
        .save(&record("Acetobacter pasteurianus", "Proteobacteria", Kingdom::Bacteria))
        .unwrap();

    let tree = store.tree(Kingdom::Bacteria).unwrap();
    assert_eq!(tree.name, "Bacteria");
    let sub = &tree.children[0].children[0];
    let names: Vec<&str> = sub.children.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, vec!["Acetobacter pasteurianus", "Zymomonas mobilis"]);
    assert_eq!(tree.file_count(), 2);
}

#[test]
fn prokaryotes_tree_groups_both_domains() {
    let (_dir, root) = temp_root();
    let store = JsonStore::new(root);
    store
        .save(&record("Escherichia coli", "Proteobacteria", Kingdom::Prokaryotes))
        .unwrap();
    store
        .save(&record("Haloferax volcanii", "Euryarchaeota", Kingdom::Prokaryotes))
        .unwrap();

    let tree = store.tree(Kingdom::Prokaryotes).unwrap();
    let domains: Vec<&str> = tree.children.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(domains, vec!["Bacteria", "Archaea"]);
    assert_eq!(tree.children[0].file_count(), 1);
    assert_eq!(tree.children[1].file_count(), 1);
}
