use crate::extract::{
    element_text, has_class, normalize_text, own_text, select_all, select_first, select_text,
};
use crate::record::{FeeStatus, PetitionEvent, PublicationEvent, RecordDetail};
use indexmap::IndexMap;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use std::sync::OnceLock;

const PUBLICATIONS_TABLE: &str =
    "div.accordion-item input#accordion-3 + label + div.accordion-content table";
const PETITIONS_TABLE: &str =
    "div.accordion-item input#accordion-1 + label + div.accordion-content table";
const FEES_TABLE: &str =
    "div.accordion-item input#accordion-2 + label + div.accordion-content table";

/// Section headings of the petitions table
const PETITION_SECTIONS: [&str; 3] = ["Serviços", "Anuidade", "Outros"];

fn last_update_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"atualizados até\s*(\d{2}/\d{2}/\d{4})").expect("valid last update pattern")
    })
}

/// Extracts all populated sections of a detail page
///
/// # Arguments
///
/// * `html` - The detail page content
///
/// # Returns
///
/// A `RecordDetail` whose absent sections are `None`/empty. A page with no
/// recognizable section yields `RecordDetail::default()`.
pub fn extract_detail(html: &str) -> RecordDetail {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let fonts = select_all(root, "font");

    let mut detail = RecordDetail {
        full_number: select_text(root, "font.marcador"),
        filing_date: labelled_value(&fonts, "Data do Depósito:"),
        publication_date: labelled_value(&fonts, "Data da Publicação:").and_then(strip_dash),
        grant_date: labelled_value(&fonts, "Data da Concessão:").and_then(strip_dash),
        title: select_text(root, "div#tituloContext"),
        abstract_text: select_text(root, "div#resumoContext"),
        classification_codes: classification_codes(root),
        agent: labelled_value(&fonts, "Nome do Procurador:"),
        publications: publications(root),
        petitions: petitions(root),
        fees: fees(root),
        last_updated: last_updated(&fonts),
        ..Default::default()
    };

    if let Some(raw) = labelled_value(&fonts, "Nome do Depositante:") {
        detail.applicants = split_names(&raw);
        detail.applicants_raw = Some(raw);
    }
    if let Some(raw) = labelled_value(&fonts, "Nome do Inventor:") {
        detail.inventors = split_names(&raw);
        detail.inventors_raw = Some(raw);
    }

    detail
}

/// Value printed in the first `font.normal` after a label font
fn labelled_value(fonts: &[ElementRef<'_>], label: &str) -> Option<String> {
    let position = fonts.iter().position(|f| own_text(*f).contains(label))?;
    fonts[position + 1..]
        .iter()
        .find(|f| has_class(**f, "normal"))
        .and_then(|f| normalize_text(&element_text(*f)))
}

/// Dates print as "-" when the event has not happened yet
fn strip_dash(value: String) -> Option<String> {
    normalize_text(&value.replace('-', ""))
}

fn split_names(raw: &str) -> Vec<String> {
    raw.split('/').filter_map(normalize_text).collect()
}

fn classification_codes(root: ElementRef<'_>) -> Vec<String> {
    select_all(root, "a.normal[onmouseout]")
        .into_iter()
        .filter(|a| {
            a.value().attr("href") == Some("javascript:void(0)")
                && a
                    .value()
                    .attr("onmouseout")
                    .is_some_and(|handler| handler.contains("hideMe('classificacao"))
        })
        .filter_map(|a| normalize_text(&element_text(a)))
        .collect()
}

fn publications(root: ElementRef<'_>) -> Vec<PublicationEvent> {
    let Some(table) = select_first(root, PUBLICATIONS_TABLE) else {
        return Vec::new();
    };

    select_all(table, "tr.normal")
        .into_iter()
        .filter_map(|row| {
            let bulletin = select_text(row, "td:nth-of-type(1) font.normal")?;
            let date = select_text(row, "td:nth-of-type(2) font.normal b")?;
            let code = select_text(row, "td:nth-of-type(3) font.normal a")?;
            Some(PublicationEvent {
                bulletin,
                date,
                code,
                has_attachment: select_first(row, "td:nth-of-type(4) img[src*='iconePdf.png']")
                    .is_some(),
                remark: select_text(row, "td:nth-of-type(6) font.normal").unwrap_or_default(),
            })
        })
        .collect()
}

fn petitions(root: ElementRef<'_>) -> Vec<PetitionEvent> {
    let Some(table) = select_first(root, PETITIONS_TABLE) else {
        return Vec::new();
    };

    let mut petitions = Vec::new();
    for heading in select_all(table, "font.titulo") {
        let Some(section) = normalize_text(&element_text(heading))
            .filter(|s| PETITION_SECTIONS.contains(&s.as_str()))
        else {
            continue;
        };
        let Some(heading_row) = heading
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "tr")
        else {
            continue;
        };

        // Rows up to the next section heading belong to this section
        let rows = heading_row
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "tr")
            .take_while(|row| select_first(*row, "font.titulo").is_none())
            .filter(|row| has_class(*row, "normal"));

        for row in rows {
            let service = select_text(row, "td:nth-of-type(1) font.normal a");
            let protocol = select_text(row, "td:nth-of-type(3) font.normal");
            let date = select_text(row, "td:nth-of-type(4) font.normal");
            let (Some(service_code), Some(protocol), Some(date)) = (service, protocol, date) else {
                continue;
            };
            petitions.push(PetitionEvent {
                section: section.clone(),
                service_code,
                has_payment: select_first(row, "td:nth-of-type(2) img[alt*='Pagamento']")
                    .is_some(),
                protocol,
                date,
                client: select_text(row, "td:nth-of-type(8) font.normal").unwrap_or_default(),
            });
        }
    }
    petitions
}

/// Fee period statuses, keyed `anuidade_<n>`
///
/// Each status icon is labelled by the nearest `font.normal` before it in
/// document order.
fn fees(root: ElementRef<'_>) -> IndexMap<String, FeeStatus> {
    let mut fees = IndexMap::new();
    let Some(table) = select_first(root, FEES_TABLE) else {
        return fees;
    };

    let icons: HashSet<_> = select_all(table, "a[href*='javascript:void(0)'] img[alt*='Anuidade']")
        .into_iter()
        .map(|img| img.id())
        .collect();

    let mut label: Option<String> = None;
    for element in table.descendants().filter_map(ElementRef::wrap) {
        if element.value().name() == "font" && has_class(element, "normal") {
            label = normalize_text(&element_text(element));
        } else if icons.contains(&element.id()) {
            let Some(period) = label.as_deref() else {
                continue;
            };
            let period = period.split('ª').next().unwrap_or(period).trim();
            let status = if element
                .value()
                .attr("alt")
                .is_some_and(|alt| alt.contains("Averbada"))
            {
                FeeStatus::Paid
            } else {
                FeeStatus::Unpaid
            };
            fees.insert(format!("anuidade_{}", period), status);
        }
    }
    fees
}

fn last_updated(fonts: &[ElementRef<'_>]) -> Option<String> {
    fonts
        .iter()
        .find(|f| own_text(**f).contains("Dados atualizados até"))
        .and_then(|f| {
            let text = normalize_text(&element_text(*f))?;
            let captures = last_update_pattern().captures(&text)?;
            Some(captures.get(1)?.as_str().to_string())
        })
}
