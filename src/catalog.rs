use std::collections::HashSet;
use std::io::BufRead;

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::{GeneRef, Kingdom, Organism, ProkaryoteGroup, RepliconType};
use crate::error::KiraError;

const ABSENT: &str = "-";

pub fn load_organisms<R: BufRead>(
    reader: R,
    kingdom: Kingdom,
    bio_project: Option<&str>,
) -> Result<Vec<Organism>, KiraError> {
    let parsed = parse_organisms(reader, kingdom)?;
    let total = parsed.len();
    let mut organisms = filter_organisms(parsed, kingdom, bio_project);
    for organism in &mut organisms {
        organism.path = Some(organism.default_path());
    }
    debug!(
        kingdom = %kingdom,
        parsed = total,
        kept = organisms.len(),
        "loaded organism listing"
    );
    Ok(organisms)
}

pub fn parse_organisms<R: BufRead>(reader: R, kingdom: Kingdom) -> Result<Vec<Organism>, KiraError> {
    let layout = kingdom.layout();
    let min_columns = layout.min_columns();
    let mut organisms = Vec::new();

    for line in reader.lines().skip(1) {
        let line = line.map_err(|err| KiraError::Stream(format!("{kingdom} listing: {err}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < min_columns {
            continue;
        }

        let group = columns[layout.group].trim().to_string();
        let prokaryote_group = if kingdom.is_prokaryotic() {
            ProkaryoteGroup::from_group_name(&group)
        } else {
            None
        };

        organisms.push(Organism {
            name: columns[layout.name].trim().to_string(),
            bio_project: layout
                .bio_project
                .map(|index| columns[index].trim())
                .filter(|value| !value.is_empty() && *value != ABSENT)
                .map(str::to_string),
            group,
            sub_group: columns[layout.sub_group].trim().to_string(),
            updated: parse_date(columns[layout.updated]),
            kingdom,
            path: None,
            prokaryote_group,
            genes: parse_gene_ids(columns[layout.replicons]),
        });
    }
    Ok(organisms)
}

pub fn filter_organisms(
    organisms: Vec<Organism>,
    kingdom: Kingdom,
    bio_project: Option<&str>,
) -> Vec<Organism> {
    let mut seen = HashSet::new();
    organisms
        .into_iter()
        .filter(|organism| !organism.genes.is_empty())
        .filter(|organism| match kingdom {
            Kingdom::Prokaryotes => organism.prokaryote_group.is_some(),
            Kingdom::Bacteria | Kingdom::Archaea => organism
                .prokaryote_group
                .as_ref()
                .is_some_and(|group| group.domain.kingdom() == kingdom),
            _ => true,
        })
        .filter(|organism| match bio_project {
            Some(wanted) => organism.bio_project.as_deref() == Some(wanted),
            None => true,
        })
        .filter(|organism| {
            seen.insert((
                organism.name.clone(),
                organism.group.clone(),
                organism.sub_group.clone(),
            ))
        })
        .collect()
}

/// Parses a replicon column such as
/// `chromosome 1:NC_003070.9/CP002684.1; mitochondrion MT:NC_037304.1/BK010421.1`.
///
/// Chromosomes are only kept when their accession is a reference one.
pub fn parse_gene_ids(column: &str) -> Vec<GeneRef> {
    let column = column.trim();
    if column.is_empty() || column == ABSENT {
        return Vec::new();
    }
    column
        .split(';')
        .filter_map(|segment| {
            let (label, identifiers) = match segment.split_once(':') {
                Some((label, identifiers)) => (label.split_whitespace().next(), identifiers),
                None => (None, segment),
            };
            let accession = identifiers.trim().split('/').next()?.trim();
            if accession.is_empty() || accession == ABSENT {
                return None;
            }
            let is_chromosome = label.is_some_and(|label| label.eq_ignore_ascii_case("chromosome"));
            if is_chromosome && !accession.to_lowercase().starts_with("nc") {
                return None;
            }
            Some(GeneRef::new(accession, RepliconType::normalize(label)))
        })
        .collect()
}

pub fn parse_date(column: &str) -> Option<NaiveDate> {
    let column = column.trim();
    if column == ABSENT {
        return None;
    }
    let parts: Vec<&str> = column.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let format = if parts[0].len() == 4 {
        "%Y/%m/%d"
    } else {
        "%d/%m/%Y"
    };
    NaiveDate::parse_from_str(column, format).ok()
}
