use camino::Utf8PathBuf;
use chrono::NaiveDate;

use kira_codon_usage::catalog::{load_organisms, parse_date, parse_gene_ids, parse_organisms};
use kira_codon_usage::domain::{GeneRef, Kingdom, ProkaryoteDomain, RepliconType};

const PROKARYOTES_HEADER: &str = "#Organism/Name\tTaxID\tBioProject Accession\tBioProject ID\tGroup\tSubGroup\tSize (Mb)\tGC%\tReplicons\tWGS\tScaffolds\tGenes\tProteins\tRelease Date\tModify Date\tStatus\tCenter";

fn prokaryote_row(name: &str, bio_project: &str, group: &str, replicons: &str, date: &str) -> String {
    let mut columns = vec!["-"; 17];
    columns[0] = name;
    columns[4] = bio_project;
    columns[5] = group;
    columns[6] = "Sub";
    columns[10] = replicons;
    columns[16] = date;
    columns.join("\t")
}

fn prokaryotes_report(rows: &[String]) -> String {
    let mut report = String::from(PROKARYOTES_HEADER);
    for row in rows {
        report.push('\n');
        report.push_str(row);
    }
    report.push('\n');
    report
}

#[test]
fn prokaryotes_keep_classified_organisms_with_genes() {
    let report = prokaryotes_report(&[
        prokaryote_row(
            "Escherichia coli",
            "PRJNA57779",
            "Proteobacteria",
            "chromosome:NC_000913.3/U00096.3",
            "2016/03/07",
        ),
        prokaryote_row("Candidatus X", "PRJNA1", "Other", "chromosome:NC_000001.1/A1", "-"),
        prokaryote_row("Empty genome", "PRJNA2", "Firmicutes", "-", "-"),
        prokaryote_row(
            "Haloferax volcanii",
            "PRJNA46845",
            "Euryarchaeota",
            "chromosome:NC_013967.1/CP001956.1; plasmid pHV1:NC_013968.1/CP001957.1",
            "11/05/2015",
        ),
    ]);

    let organisms = load_organisms(report.as_bytes(), Kingdom::Prokaryotes, None).unwrap();
    let names: Vec<&str> = organisms.iter().map(|organism| organism.name.as_str()).collect();
    assert_eq!(names, vec!["Escherichia coli", "Haloferax volcanii"]);

    let haloferax = &organisms[1];
    assert_eq!(
        haloferax.prokaryote_group.as_ref().map(|group| group.domain),
        Some(ProkaryoteDomain::Archaea)
    );
    assert_eq!(
        haloferax.path,
        Some(Utf8PathBuf::from("Archaea/Euryarchaeota/Sub/Haloferax volcanii"))
    );
    assert_eq!(haloferax.updated, NaiveDate::from_ymd_opt(2015, 5, 11));
    assert_eq!(haloferax.genes[1], GeneRef::new("NC_013968.1", RepliconType::Plasmid));
}

#[test]
fn domain_scopes_keep_their_own_organisms() {
    let report = prokaryotes_report(&[
        prokaryote_row("E. coli", "PRJNA1", "Proteobacteria", "chromosome:NC_1/A", "-"),
        prokaryote_row("H. volcanii", "PRJNA2", "Euryarchaeota", "chromosome:NC_2/B", "-"),
    ]);

    let bacteria = load_organisms(report.as_bytes(), Kingdom::Bacteria, None).unwrap();
    assert_eq!(bacteria.len(), 1);
    assert_eq!(bacteria[0].name, "E. coli");

    let archaea = load_organisms(report.as_bytes(), Kingdom::Archaea, None).unwrap();
    assert_eq!(archaea.len(), 1);
    assert_eq!(archaea[0].name, "H. volcanii");
    assert_eq!(archaea[0].path, Some(Utf8PathBuf::from("Archaea/Euryarchaeota/Sub/H. volcanii")));
}

#[test]
fn bio_project_filter_and_duplicates() {
    let row = prokaryote_row("E. coli", "PRJNA1", "Proteobacteria", "chromosome:NC_1/A", "-");
    let report = prokaryotes_report(&[
        row.clone(),
        row,
        prokaryote_row("B. subtilis", "PRJNA2", "Firmicutes", "chromosome:NC_2/B", "-"),
    ]);

    let all = load_organisms(report.as_bytes(), Kingdom::Prokaryotes, None).unwrap();
    assert_eq!(all.len(), 2);

    let filtered = load_organisms(report.as_bytes(), Kingdom::Prokaryotes, Some("PRJNA2")).unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].name, "B. subtilis");
}

#[test]
fn short_rows_are_skipped() {
    let report = format!(
        "{PROKARYOTES_HEADER}\nTruncated\tPRJNA1\n{}\n",
        prokaryote_row("E. coli", "PRJNA1", "Proteobacteria", "chromosome:NC_1/A", "-")
    );
    let organisms = parse_organisms(report.as_bytes(), Kingdom::Prokaryotes).unwrap();
    assert_eq!(organisms.len(), 1);
}

#[test]
fn eukaryota_layout() {
    let mut columns = vec!["-"; 16];
    columns[0] = "Arabidopsis thaliana";
    columns[3] = "PRJNA10719";
    columns[4] = "Plants";
    columns[5] = "Land Plants";
    columns[9] = "chromosome 1:NC_003070.9/CP002684.1; chromosome 2:CM000072.1";
    columns[15] = "2018/03/12";
    let report = format!("header\n{}\n", columns.join("\t"));

    let organisms = load_organisms(report.as_bytes(), Kingdom::Eukaryota, None).unwrap();
    assert_eq!(organisms.len(), 1);
    let organism = &organisms[0];
    assert_eq!(organism.bio_project.as_deref(), Some("PRJNA10719"));
    assert!(organism.prokaryote_group.is_none());
    assert_eq!(organism.genes, vec![GeneRef::new("NC_003070.9", RepliconType::Chromosome)]);
    assert_eq!(
        organism.path,
        Some(Utf8PathBuf::from("Eukaryota/Plants/Land Plants/Arabidopsis thaliana"))
    );
}

#[test]
fn gene_ids_without_types() {
    let genes = parse_gene_ids("NC_001477.1/M87512.1");
    assert_eq!(genes, vec![GeneRef::new("NC_001477.1", RepliconType::Replicon)]);
    assert!(parse_gene_ids("-").is_empty());
}

#[test]
fn dates_in_both_orders() {
    assert_eq!(parse_date("2016/03/07"), NaiveDate::from_ymd_opt(2016, 3, 7));
    assert_eq!(parse_date("07/03/2016"), NaiveDate::from_ymd_opt(2016, 3, 7));
    assert_eq!(parse_date("-"), None);
    assert_eq!(parse_date("March 2016"), None);
}
