use std::collections::BTreeSet;

/// How two devices are wired together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkType {
    Pcie,
    /// Dedicated device-to-device fabric.
    Fabric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IoLink {
    pub node_from: u32, // physical id
    pub node_to: u32,   // physical id
    pub link_type: LinkType,
}

/// The interconnect snapshot of an emulated system.
///
/// Logical device `i` sits at physical id `phy_ids[i]`. Links are undirected and
/// keyed by physical id, since that is how the fabric addresses devices.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    phy_ids: Vec<u32>,
    links: BTreeSet<IoLink>,
}

impl Topology {
    #[must_use]
    pub fn new(phy_ids: Vec<u32>) -> Self {
        Self {
            phy_ids,
            links: BTreeSet::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn device_count(&self) -> u32 {
        self.phy_ids.len() as u32
    }

    /// Resolves a logical device index to its physical id.
    #[must_use]
    pub fn phy_id(&self, device_id: u32) -> Option<u32> {
        self.phy_ids.get(device_id as usize).copied()
    }

    #[must_use]
    pub fn contains_phy(&self, phy_id: u32) -> bool {
        self.phy_ids.contains(&phy_id)
    }

    /// Adds an undirected link between two physical ids. Self links are ignored.
    pub fn add_link(&mut self, a: u32, b: u32, link_type: LinkType) {
        if a == b {
            return;
        }
        let (node_from, node_to) = if a < b { (a, b) } else { (b, a) };
        self.links.insert(IoLink {
            node_from,
            node_to,
            link_type,
        });
    }

    #[must_use]
    pub fn link_between(&self, a: u32, b: u32) -> Option<&IoLink> {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        self.links
            .iter()
            .find(|l| l.node_from == lo && l.node_to == hi)
    }

    #[must_use]
    pub fn is_linked(&self, a: u32, b: u32) -> bool {
        self.link_between(a, b).is_some()
    }

    /// All links touching `phy_id`.
    pub fn io_links(&self, phy_id: u32) -> impl Iterator<Item = &IoLink> {
        self.links
            .iter()
            .filter(move |l| l.node_from == phy_id || l.node_to == phy_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> Topology {
        let mut topo = Topology::new(vec![4, 5, 6, 7]);
        topo.add_link(4, 5, LinkType::Fabric);
        topo.add_link(7, 6, LinkType::Pcie);
        topo
    }

    #[test]
    fn resolves_logical_to_physical() {
        let topo = two_by_two();
        assert_eq!(topo.device_count(), 4);
        assert_eq!(topo.phy_id(0), Some(4));
        assert_eq!(topo.phy_id(3), Some(7));
        assert_eq!(topo.phy_id(4), None);
    }

    #[test]
    fn links_are_undirected() {
        let topo = two_by_two();
        assert!(topo.is_linked(4, 5));
        assert!(topo.is_linked(5, 4));
        assert!(topo.is_linked(6, 7));
        assert!(!topo.is_linked(4, 6));
        assert_eq!(topo.link_between(7, 6).map(|l| l.link_type), Some(LinkType::Pcie));
    }

    #[test]
    fn self_links_are_ignored() {
        let mut topo = Topology::new(vec![0, 1]);
        topo.add_link(1, 1, LinkType::Fabric);
        assert!(!topo.is_linked(1, 1));
        assert_eq!(topo.io_links(1).count(), 0);
    }
}
