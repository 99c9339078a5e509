//! Validates request bodies into the commands the store understands.
use crate::types::protocol::{LinksPayload, RawLink, VacancyPayload};

/// Reason used when a failure is reported without one.
pub const UNKNOWN_REASON: &str = "unknown";

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ParsingError {
    #[error("links must be an array")]
    MissingLinks,
    #[error("links must not be empty")]
    EmptyBatch,
    #[error("links[{index}] is missing a url")]
    MissingUrl { index: usize },
    #[error("pageNumber is required")]
    MissingPageNumber,
    #[error("pageNumber must not be negative")]
    NegativePageNumber,
    #[error("vacancyId is required")]
    MissingVacancyId,
}

/// A link accepted for insertion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewLink {
    pub url: String,
    pub title: String,
}

/// A validated scrape batch: every link has a non-empty url.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IngestBatch {
    pub links: Vec<NewLink>,
    pub page_number: i64,
}

/// A validated `vacancyId`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VacancyId(pub i64);

/// A validated failure report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailureReport {
    pub id: VacancyId,
    pub reason: String,
}

impl TryFrom<(usize, RawLink)> for NewLink {
    type Error = ParsingError;

    fn try_from((index, raw): (usize, RawLink)) -> Result<Self, Self::Error> {
        let url = raw
            .url
            .map(|url| url.trim().to_owned())
            .filter(|url| !url.is_empty())
            .ok_or(ParsingError::MissingUrl { index })?;

        let title = raw.title.map(|t| t.trim().to_owned()).unwrap_or_default();

        Ok(NewLink { url, title })
    }
}

impl TryFrom<LinksPayload> for IngestBatch {
    type Error = ParsingError;

    fn try_from(value: LinksPayload) -> Result<Self, Self::Error> {
        let raw = value.links.ok_or(ParsingError::MissingLinks)?;
        if raw.is_empty() {
            return Err(ParsingError::EmptyBatch);
        }

        let page_number =
            value.page_number.ok_or(ParsingError::MissingPageNumber)?;
        if page_number < 0 {
            return Err(ParsingError::NegativePageNumber);
        }

        let links = raw
            .into_iter()
            .enumerate()
            .map(NewLink::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IngestBatch { links, page_number })
    }
}

impl TryFrom<&VacancyPayload> for VacancyId {
    type Error = ParsingError;

    fn try_from(value: &VacancyPayload) -> Result<Self, Self::Error> {
        value
            .vacancy_id
            .map(VacancyId)
            .ok_or(ParsingError::MissingVacancyId)
    }
}

impl TryFrom<VacancyPayload> for FailureReport {
    type Error = ParsingError;

    fn try_from(value: VacancyPayload) -> Result<Self, Self::Error> {
        let id = VacancyId::try_from(&value)?;
        let reason = value
            .reason
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| UNKNOWN_REASON.to_owned());

        Ok(FailureReport { id, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: Option<&str>, title: Option<&str>) -> RawLink {
        RawLink {
            url: url.map(Into::into),
            title: title.map(Into::into),
        }
    }

    #[test]
    fn test_parse_batch() {
        use ParsingError::*;

        #[track_caller]
        fn err(payload: LinksPayload, expected: ParsingError) {
            assert_eq!(IngestBatch::try_from(payload), Err(expected));
        }

        let ok = IngestBatch::try_from(LinksPayload {
            links: Some(vec![
                link(Some(" https://hh.ru/a "), Some(" Rust dev ")),
                link(Some("https://hh.ru/b"), None),
            ]),
            page_number: Some(2),
        });
        assert_eq!(
            ok,
            Ok(IngestBatch {
                links: vec![
                    NewLink {
                        url: "https://hh.ru/a".into(),
                        title: "Rust dev".into(),
                    },
                    NewLink {
                        url: "https://hh.ru/b".into(),
                        title: "".into(),
                    },
                ],
                page_number: 2,
            })
        );

        err(LinksPayload::default(), MissingLinks);
        err(
            LinksPayload {
                links: Some(vec![]),
                page_number: Some(0),
            },
            EmptyBatch,
        );
        err(
            LinksPayload {
                links: Some(vec![link(Some("https://hh.ru/a"), None)]),
                page_number: None,
            },
            MissingPageNumber,
        );
        err(
            LinksPayload {
                links: Some(vec![link(Some("https://hh.ru/a"), None)]),
                page_number: Some(-1),
            },
            NegativePageNumber,
        );
        err(
            LinksPayload {
                links: Some(vec![
                    link(Some("https://hh.ru/a"), None),
                    link(Some("   "), Some("blank")),
                ]),
                page_number: Some(0),
            },
            MissingUrl { index: 1 },
        );
    }

    #[test]
    fn test_parse_vacancy_payloads() {
        let none = VacancyPayload::default();
        assert_eq!(
            VacancyId::try_from(&none),
            Err(ParsingError::MissingVacancyId)
        );

        let report = FailureReport::try_from(VacancyPayload {
            vacancy_id: Some(7),
            reason: Some("  ".into()),
        });
        assert_eq!(
            report,
            Ok(FailureReport {
                id: VacancyId(7),
                reason: UNKNOWN_REASON.into(),
            })
        );

        let report = FailureReport::try_from(VacancyPayload {
            vacancy_id: Some(7),
            reason: Some("no button".into()),
        });
        assert_eq!(report.map(|r| r.reason), Ok("no button".to_owned()));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ParsingError::MissingUrl { index: 3 }.to_string(),
            "links[3] is missing a url"
        );
        assert_eq!(
            ParsingError::MissingVacancyId.to_string(),
            "vacancyId is required"
        );
    }
}
