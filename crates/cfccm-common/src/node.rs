//! Backend address selection for Nodes

use k8s_openapi::api::core::v1::Node;

/// Node address type carrying the externally reachable IP
pub const EXTERNAL_IP: &str = "ExternalIP";

/// First `ExternalIP` address in the Node status, if any
pub fn external_ip(node: &Node) -> Option<&str> {
    node.status
        .as_ref()?
        .addresses
        .as_ref()?
        .iter()
        .find(|addr| addr.type_ == EXTERNAL_IP && !addr.address.is_empty())
        .map(|addr| addr.address.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeAddress, NodeStatus};
    use kube::api::ObjectMeta;

    fn node(addresses: Vec<(&str, &str)>) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                addresses: Some(
                    addresses
                        .into_iter()
                        .map(|(type_, address)| NodeAddress {
                            type_: type_.to_string(),
                            address: address.to_string(),
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_external_ip() {
        let n = node(vec![
            ("InternalIP", "10.0.0.1"),
            ("ExternalIP", "203.0.113.5"),
            ("ExternalIP", "203.0.113.6"),
        ]);
        assert_eq!(external_ip(&n), Some("203.0.113.5"));
    }

    #[test]
    fn none_without_external_ip() {
        let n = node(vec![("InternalIP", "10.0.0.1"), ("Hostname", "worker-1")]);
        assert_eq!(external_ip(&n), None);
    }

    #[test]
    fn empty_external_ip_is_skipped() {
        let n = node(vec![("ExternalIP", "")]);
        assert_eq!(external_ip(&n), None);
    }

    #[test]
    fn none_without_status() {
        assert_eq!(external_ip(&Node::default()), None);
    }
}
