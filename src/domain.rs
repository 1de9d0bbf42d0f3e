use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

/// Accession prefix of curated RefSeq records. Only these are fetched and retried.
pub const REFERENCE_PREFIX: &str = "NC_";

pub fn is_reference_accession(accession: &str) -> bool {
    accession.starts_with(REFERENCE_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Kingdom {
    Eukaryota,
    Prokaryotes,
    Bacteria,
    Archaea,
    Viruses,
    Organelles,
    Viroids,
    Plasmids,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub name: usize,
    pub bio_project: Option<usize>,
    pub group: usize,
    pub sub_group: usize,
    pub replicons: usize,
    pub updated: usize,
}

impl ColumnLayout {
    pub fn min_columns(&self) -> usize {
        [
            self.name,
            self.bio_project.unwrap_or(0),
            self.group,
            self.sub_group,
            self.replicons,
            self.updated,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

impl Kingdom {
    pub const ALL: [Kingdom; 8] = [
        Kingdom::Eukaryota,
        Kingdom::Prokaryotes,
        Kingdom::Bacteria,
        Kingdom::Archaea,
        Kingdom::Viruses,
        Kingdom::Organelles,
        Kingdom::Viroids,
        Kingdom::Plasmids,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Kingdom::Eukaryota => "Eukaryota",
            Kingdom::Prokaryotes => "Prokaryotes",
            Kingdom::Bacteria => "Bacteria",
            Kingdom::Archaea => "Archaea",
            Kingdom::Viruses => "Viruses",
            Kingdom::Organelles => "Organelles",
            Kingdom::Viroids => "Viroids",
            Kingdom::Plasmids => "Plasmids",
        }
    }

    pub fn layout(self) -> ColumnLayout {
        match self {
            Kingdom::Eukaryota => ColumnLayout {
                name: 0,
                bio_project: Some(3),
                group: 4,
                sub_group: 5,
                replicons: 9,
                updated: 15,
            },
            Kingdom::Plasmids => ColumnLayout {
                name: 0,
                bio_project: None,
                group: 2,
                sub_group: 3,
                replicons: 5,
                updated: 16,
            },
            Kingdom::Prokaryotes | Kingdom::Bacteria | Kingdom::Archaea => ColumnLayout {
                name: 0,
                bio_project: Some(4),
                group: 5,
                sub_group: 6,
                replicons: 10,
                updated: 16,
            },
            Kingdom::Viruses | Kingdom::Viroids => ColumnLayout {
                name: 0,
                bio_project: Some(1),
                group: 2,
                sub_group: 3,
                replicons: 7,
                updated: 11,
            },
            Kingdom::Organelles => ColumnLayout {
                name: 0,
                bio_project: Some(1),
                group: 2,
                sub_group: 3,
                replicons: 4,
                updated: 14,
            },
        }
    }

    pub fn listing_file(self) -> &'static str {
        match self {
            Kingdom::Eukaryota => "eukaryotes.txt",
            Kingdom::Prokaryotes | Kingdom::Bacteria | Kingdom::Archaea => "prokaryotes.txt",
            Kingdom::Viruses => "viruses.txt",
            Kingdom::Organelles => "organelles.txt",
            Kingdom::Viroids => "viroids.txt",
            Kingdom::Plasmids => "plasmids.txt",
        }
    }

    pub fn is_prokaryotic(self) -> bool {
        matches!(
            self,
            Kingdom::Prokaryotes | Kingdom::Bacteria | Kingdom::Archaea
        )
    }
}

impl fmt::Display for Kingdom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Kingdom {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        Kingdom::ALL
            .into_iter()
            .find(|kingdom| kingdom.label().to_lowercase() == normalized)
            .ok_or_else(|| KiraError::InvalidKingdom(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepliconType {
    Chromosome,
    Plasmid,
    Mitochondrion,
    Chloroplast,
    Dna,
    Unknown,
    Replicon,
}

impl RepliconType {
    pub fn normalize(label: Option<&str>) -> Self {
        let Some(label) = label else {
            return RepliconType::Replicon;
        };
        match label.trim().to_lowercase().as_str() {
            "chromosome" => RepliconType::Chromosome,
            "plasmid" => RepliconType::Plasmid,
            "mitochondrion" => RepliconType::Mitochondrion,
            "chloroplast" => RepliconType::Chloroplast,
            "dna" => RepliconType::Dna,
            "unknown" => RepliconType::Unknown,
            _ => RepliconType::Replicon,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RepliconType::Chromosome => "chromosome",
            RepliconType::Plasmid => "plasmid",
            RepliconType::Mitochondrion => "mitochondrion",
            RepliconType::Chloroplast => "chloroplast",
            RepliconType::Dna => "dna",
            RepliconType::Unknown => "unknown",
            RepliconType::Replicon => "replicon",
        }
    }
}

impl fmt::Display for RepliconType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProkaryoteDomain {
    Bacteria,
    Archaea,
}

impl ProkaryoteDomain {
    pub fn kingdom(self) -> Kingdom {
        match self {
            ProkaryoteDomain::Bacteria => Kingdom::Bacteria,
            ProkaryoteDomain::Archaea => Kingdom::Archaea,
        }
    }
}

const ARCHAEAL_GROUPS: &[&str] = &[
    "euryarchaeota",
    "crenarchaeota",
    "thaumarchaeota",
    "nanoarchaeota",
    "korarchaeota",
    "aigarchaeota",
    "asgard group",
    "dpann group",
    "tack group",
    "nanohaloarchaeota",
    "archaea",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProkaryoteGroup {
    pub name: String,
    pub domain: ProkaryoteDomain,
}

impl ProkaryoteGroup {
    pub fn from_group_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        let lowered = trimmed.to_lowercase();
        if lowered.is_empty()
            || lowered == "-"
            || lowered == "other"
            || lowered.starts_with("unclassified")
        {
            return None;
        }
        let domain = if ARCHAEAL_GROUPS
            .iter()
            .any(|group| lowered == *group || lowered.ends_with("archaeota"))
        {
            ProkaryoteDomain::Archaea
        } else {
            ProkaryoteDomain::Bacteria
        };
        Some(Self {
            name: trimmed.to_string(),
            domain,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneRef {
    pub accession: String,
    pub replicon: RepliconType,
}

impl GeneRef {
    pub fn new(accession: impl Into<String>, replicon: RepliconType) -> Self {
        Self {
            accession: accession.into(),
            replicon,
        }
    }

    pub fn is_reference(&self) -> bool {
        is_reference_accession(&self.accession)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Organism {
    pub name: String,
    pub bio_project: Option<String>,
    pub group: String,
    pub sub_group: String,
    pub updated: Option<NaiveDate>,
    pub kingdom: Kingdom,
    pub path: Option<Utf8PathBuf>,
    pub prokaryote_group: Option<ProkaryoteGroup>,
    pub genes: Vec<GeneRef>,
}

impl Organism {
    pub fn filing_kingdom(&self) -> Kingdom {
        match (&self.prokaryote_group, self.kingdom) {
            (Some(group), Kingdom::Prokaryotes) => group.domain.kingdom(),
            _ => self.kingdom,
        }
    }

    pub fn default_path(&self) -> Utf8PathBuf {
        let mut path = Utf8PathBuf::from(self.filing_kingdom().label());
        path.push(sanitize_component(&self.group));
        path.push(sanitize_component(&self.sub_group));
        path.push(sanitize_component(&self.name));
        path
    }

    pub fn reference_genes(&self) -> impl Iterator<Item = &GeneRef> {
        self.genes.iter().filter(|gene| gene.is_reference())
    }
}

impl PartialEq for Organism {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.group == other.group && self.sub_group == other.sub_group
    }
}

impl Eq for Organism {}

impl Hash for Organism {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.group.hash(state);
        self.sub_group.hash(state);
    }
}

pub fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." | "-" => "Unknown".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn organism(name: &str, group: &str, sub_group: &str, kingdom: Kingdom) -> Organism {
        Organism {
            name: name.to_string(),
            bio_project: None,
            group: group.to_string(),
            sub_group: sub_group.to_string(),
            updated: None,
            kingdom,
            path: None,
            prokaryote_group: None,
            genes: Vec::new(),
        }
    }

    #[test]
    fn parse_kingdom_case_insensitive() {
        let kingdom: Kingdom = "bacteria".parse().unwrap();
        assert_eq!(kingdom, Kingdom::Bacteria);
        let err = "fungi".parse::<Kingdom>().unwrap_err();
        assert_matches!(err, KiraError::InvalidKingdom(_));
    }

    #[test]
    fn replicon_type_normalizes_unknown_labels() {
        assert_eq!(
            RepliconType::normalize(Some(" Chromosome ")),
            RepliconType::Chromosome
        );
        assert_eq!(RepliconType::normalize(Some("plasmid")), RepliconType::Plasmid);
        assert_eq!(RepliconType::normalize(Some("linkage")), RepliconType::Replicon);
        assert_eq!(RepliconType::normalize(None), RepliconType::Replicon);
    }

    #[test]
    fn organism_equality_ignores_genes_and_kingdom() {
        let mut a = organism("Escherichia coli", "Proteobacteria", "Gamma", Kingdom::Bacteria);
        let b = organism("Escherichia coli", "Proteobacteria", "Gamma", Kingdom::Prokaryotes);
        a.genes.push(GeneRef::new("NC_000913", RepliconType::Chromosome));
        assert_eq!(a, b);
        let c = organism("Escherichia coli", "Proteobacteria", "Beta", Kingdom::Bacteria);
        assert_ne!(a, c);
    }

    #[test]
    fn prokaryote_groups_resolve_to_domains() {
        let group = ProkaryoteGroup::from_group_name("Euryarchaeota").unwrap();
        assert_eq!(group.domain, ProkaryoteDomain::Archaea);
        let group = ProkaryoteGroup::from_group_name("Proteobacteria").unwrap();
        assert_eq!(group.domain, ProkaryoteDomain::Bacteria);
        assert!(ProkaryoteGroup::from_group_name("-").is_none());
        assert!(ProkaryoteGroup::from_group_name("unclassified Bacteria").is_none());
    }

    #[test]
    fn prokaryote_paths_file_under_their_domain() {
        let mut org = organism("Haloarcula marismortui", "Euryarchaeota", "Halobacteria", Kingdom::Prokaryotes);
        org.prokaryote_group = ProkaryoteGroup::from_group_name("Euryarchaeota");
        assert_eq!(
            org.default_path(),
            Utf8PathBuf::from("Archaea/Euryarchaeota/Halobacteria/Haloarcula marismortui")
        );
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_component("Salmonella enterica subsp. I/II"), "Salmonella enterica subsp. I_II");
        assert_eq!(sanitize_component("-"), "Unknown");
    }
}
