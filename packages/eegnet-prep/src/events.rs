use serde::{Deserialize, Serialize};

use crate::config::EventMap;
use crate::error::{PipelineError, Result};
use crate::types::Annotation;

/// An annotation resolved to a class index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedEvent {
    pub onset: usize,
    pub class_index: usize,
}

/// Maps annotation codes to class indices, dropping non-task markers
#[derive(Debug, Clone)]
pub struct EventLocator {
    event_map: EventMap,
}

impl EventLocator {
    pub fn new(event_map: EventMap) -> Self {
        Self { event_map }
    }

    /// Events in chronological order. Ties keep annotation order.
    pub fn locate(&self, annotations: &[Annotation]) -> Result<Vec<LocatedEvent>> {
        let mut events: Vec<LocatedEvent> = annotations
            .iter()
            .filter_map(|a| {
                self.event_map.index_of(&a.code).map(|class_index| LocatedEvent {
                    onset: a.onset,
                    class_index,
                })
            })
            .collect();

        let dropped = annotations.len() - events.len();
        if dropped > 0 {
            log::debug!("Ignored {} annotations with codes outside the event map", dropped);
        }

        if events.is_empty() {
            let mut codes: Vec<String> = annotations.iter().map(|a| a.code.clone()).collect();
            codes.sort();
            codes.dedup();
            return Err(PipelineError::NoEventsFound { codes });
        }

        events.sort_by_key(|e| e.onset);
        log::info!("Located {} task events", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_codes_are_dropped() {
        let locator = EventLocator::new(EventMap::default());
        let annotations = vec![
            Annotation::new("768", 10),
            Annotation::new("770", 20),
            Annotation::new("1023", 25),
            Annotation::new("772", 30),
        ];
        let events = locator.locate(&annotations).unwrap();
        assert_eq!(
            events,
            vec![
                LocatedEvent { onset: 20, class_index: 1 },
                LocatedEvent { onset: 30, class_index: 3 },
            ]
        );
    }

    #[test]
    fn test_events_are_sorted_chronologically() {
        let locator = EventLocator::new(EventMap::default());
        let annotations = vec![Annotation::new("771", 500), Annotation::new("769", 100)];
        let events = locator.locate(&annotations).unwrap();
        assert_eq!(events[0].onset, 100);
        assert_eq!(events[1].class_index, 2);
    }

    #[test]
    fn test_no_matching_codes_is_an_error() {
        let locator = EventLocator::new(EventMap::default());
        let annotations = vec![Annotation::new("276", 0), Annotation::new("277", 10)];
        match locator.locate(&annotations) {
            Err(PipelineError::NoEventsFound { codes }) => {
                assert_eq!(codes, vec!["276".to_string(), "277".to_string()])
            }
            other => panic!("expected NoEventsFound, got {:?}", other),
        }
    }
}
