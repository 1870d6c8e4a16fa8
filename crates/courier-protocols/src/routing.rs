//! Mediator route table: which connection receives messages for a key.

use std::sync::Arc;

use courier_core::{tag_filter, CoreError, InjectionContext, Storage, TagFilter};
use courier_messaging::messages::{
    RouteAction, RouteQueryRequest, RouteQueryResponse, RouteQueryResult, RouteUpdate,
    RouteUpdateResult, RouteUpdated,
};

use crate::error::ProtocolError;
use crate::records::{Record, RecordStore, RouteRecord};

pub struct RoutingManager {
    storage: Arc<dyn Storage>,
}

impl RoutingManager {
    pub fn new(context: &InjectionContext) -> Result<Self, ProtocolError> {
        Ok(Self {
            storage: context.inject::<dyn Storage>()?,
        })
    }

    async fn routes_for_key(&self, recipient_key: &str) -> Result<Vec<RouteRecord>, ProtocolError> {
        self.storage
            .query(&tag_filter([("recipient_key", recipient_key)]))
            .await
    }

    /// Register `recipient_key` for a connection. A key routes to one
    /// connection only.
    pub async fn create_route_record(
        &self,
        connection_id: &str,
        recipient_key: &str,
    ) -> Result<RouteRecord, ProtocolError> {
        if !self.routes_for_key(recipient_key).await?.is_empty() {
            return Err(CoreError::StorageDuplicate(format!(
                "route already exists for {}",
                recipient_key
            ))
            .into());
        }
        let route = RouteRecord::new(connection_id, recipient_key);
        self.storage.add_record(route.to_storage()?).await?;
        tracing::debug!(connection_id = %connection_id, recipient_key = %recipient_key, "route created");
        Ok(route)
    }

    pub async fn get_recipient(&self, recipient_key: &str) -> Result<RouteRecord, ProtocolError> {
        let mut routes = self.routes_for_key(recipient_key).await?;
        match routes.len() {
            0 => Err(ProtocolError::NoRecipient(recipient_key.to_string())),
            1 => Ok(routes.remove(0)),
            n => Err(CoreError::StorageDuplicate(format!(
                "{} routes for {}",
                n, recipient_key
            ))
            .into()),
        }
    }

    /// Routes of a connection, or of every connection, optionally limited
    /// to the given keys.
    pub async fn get_routes(
        &self,
        connection_id: Option<&str>,
        recipient_keys: Option<&[String]>,
    ) -> Result<Vec<RouteRecord>, ProtocolError> {
        let mut filter = TagFilter::new();
        if let Some(connection_id) = connection_id {
            filter.insert("connection_id".into(), connection_id.into());
        }
        let mut routes: Vec<RouteRecord> = self.storage.query(&filter).await?;
        if let Some(keys) = recipient_keys {
            routes.retain(|route| keys.contains(&route.recipient_key));
        }
        routes.sort_by(|a, b| a.recipient_key.cmp(&b.recipient_key));
        Ok(routes)
    }

    pub async fn delete_route_record(&self, route: &RouteRecord) -> Result<(), ProtocolError> {
        self.storage.remove(route).await?;
        tracing::debug!(recipient_key = %route.recipient_key, "route deleted");
        Ok(())
    }

    /// Apply route updates from a connection and report each outcome.
    pub async fn update_routes(
        &self,
        connection_id: &str,
        updates: &[RouteUpdate],
    ) -> Vec<RouteUpdated> {
        let mut updated = Vec::with_capacity(updates.len());
        for update in updates {
            let result = match self.apply_update(connection_id, update).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(
                        recipient_key = %update.recipient_key,
                        error = %e,
                        "route update failed"
                    );
                    RouteUpdateResult::ServerError
                }
            };
            updated.push(RouteUpdated {
                recipient_key: update.recipient_key.clone(),
                action: update.action,
                result,
            });
        }
        updated
    }

    async fn apply_update(
        &self,
        connection_id: &str,
        update: &RouteUpdate,
    ) -> Result<RouteUpdateResult, ProtocolError> {
        let existing = self.routes_for_key(&update.recipient_key).await?;
        let owned = existing.iter().find(|r| r.connection_id == connection_id);
        Ok(match update.action {
            RouteAction::Create => match (owned, existing.is_empty()) {
                (Some(_), _) => RouteUpdateResult::NoChange,
                (None, false) => RouteUpdateResult::ClientError,
                (None, true) => {
                    self.create_route_record(connection_id, &update.recipient_key)
                        .await?;
                    RouteUpdateResult::Success
                }
            },
            RouteAction::Delete => match owned {
                Some(route) => {
                    self.delete_route_record(route).await?;
                    RouteUpdateResult::Success
                }
                None => RouteUpdateResult::NoChange,
            },
        })
    }

    /// Answer a route query for a connection.
    pub async fn query_routes(
        &self,
        connection_id: &str,
        query: &RouteQueryRequest,
    ) -> Result<RouteQueryResponse, ProtocolError> {
        let keys = query
            .filter
            .as_ref()
            .and_then(|filter| filter.get("recipient_key"))
            .map(Vec::as_slice);
        let routes: Vec<RouteQueryResult> = self
            .get_routes(Some(connection_id), keys)
            .await?
            .into_iter()
            .map(|route| RouteQueryResult {
                recipient_key: route.recipient_key,
            })
            .collect();
        Ok(match &query.paginate {
            Some(paginate) => {
                let (page, paginated) = paginate.apply(&routes);
                RouteQueryResponse {
                    routes: page,
                    paginated: Some(paginated),
                }
            }
            None => RouteQueryResponse {
                routes,
                paginated: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_messaging::messages::Paginate;
    use courier_wallet::BasicStorage;
    use std::collections::BTreeMap;

    fn manager() -> RoutingManager {
        let mut context = InjectionContext::default();
        context.bind_instance::<dyn Storage>(Arc::new(BasicStorage::new()));
        RoutingManager::new(&context).unwrap()
    }

    #[tokio::test]
    async fn test_route_lifecycle() {
        let routing = manager();
        routing.create_route_record("conn-1", "KEY1").await.unwrap();
        let err = routing.create_route_record("conn-2", "KEY1").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Core(CoreError::StorageDuplicate(_))));

        let route = routing.get_recipient("KEY1").await.unwrap();
        assert_eq!(route.connection_id, "conn-1");
        routing.delete_route_record(&route).await.unwrap();
        assert!(matches!(
            routing.get_recipient("KEY1").await,
            Err(ProtocolError::NoRecipient(_))
        ));
    }

    #[tokio::test]
    async fn test_get_routes_filters() {
        let routing = manager();
        routing.create_route_record("conn-1", "A").await.unwrap();
        routing.create_route_record("conn-1", "B").await.unwrap();
        routing.create_route_record("conn-2", "C").await.unwrap();

        assert_eq!(routing.get_routes(None, None).await.unwrap().len(), 3);
        let mine = routing.get_routes(Some("conn-1"), None).await.unwrap();
        assert_eq!(mine.len(), 2);
        let only_b = routing
            .get_routes(Some("conn-1"), Some(&["B".to_string()]))
            .await
            .unwrap();
        assert_eq!(only_b[0].recipient_key, "B");
    }

    #[tokio::test]
    async fn test_update_routes_results() {
        let routing = manager();
        routing.create_route_record("other", "TAKEN").await.unwrap();
        let updates = vec![
            RouteUpdate {
                recipient_key: "NEW".into(),
                action: RouteAction::Create,
            },
            RouteUpdate {
                recipient_key: "NEW".into(),
                action: RouteAction::Create,
            },
            RouteUpdate {
                recipient_key: "TAKEN".into(),
                action: RouteAction::Create,
            },
            RouteUpdate {
                recipient_key: "MISSING".into(),
                action: RouteAction::Delete,
            },
        ];
        let results: Vec<RouteUpdateResult> = routing
            .update_routes("mine", &updates)
            .await
            .into_iter()
            .map(|u| u.result)
            .collect();
        assert_eq!(
            results,
            vec![
                RouteUpdateResult::Success,
                RouteUpdateResult::NoChange,
                RouteUpdateResult::ClientError,
                RouteUpdateResult::NoChange,
            ]
        );

        let delete = [RouteUpdate {
            recipient_key: "NEW".into(),
            action: RouteAction::Delete,
        }];
        assert_eq!(
            routing.update_routes("mine", &delete).await[0].result,
            RouteUpdateResult::Success
        );
        assert!(routing.get_routes(Some("mine"), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_routes_paginated() {
        let routing = manager();
        for key in ["K1", "K2", "K3"] {
            routing.create_route_record("conn", key).await.unwrap();
        }
        let query = RouteQueryRequest {
            filter: None,
            paginate: Some(Paginate {
                limit: Some(2),
                offset: Some(1),
            }),
        };
        let response = routing.query_routes("conn", &query).await.unwrap();
        let keys: Vec<&str> = response.routes.iter().map(|r| r.recipient_key.as_str()).collect();
        assert_eq!(keys, vec!["K2", "K3"]);
        let paginated = response.paginated.unwrap();
        assert_eq!((paginated.start, paginated.end, paginated.total), (1, 3, 3));

        let mut filter = BTreeMap::new();
        filter.insert("recipient_key".to_string(), vec!["K1".to_string()]);
        let query = RouteQueryRequest {
            filter: Some(filter),
            paginate: None,
        };
        let response = routing.query_routes("conn", &query).await.unwrap();
        assert_eq!(response.routes.len(), 1);
        assert!(response.paginated.is_none());
    }
}
