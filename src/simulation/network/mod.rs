use crate::simulation::id::Id;
use nohash_hasher::IntMap;

/// Road network used by the router and the network engine. Links are stored in insertion order
/// and looked up through their id.
#[derive(Debug, Default)]
pub struct Network {
    nodes: Vec<Node>,
    links: Vec<Link>,
    node_index: IntMap<Id<Node>, usize>,
    link_index: IntMap<Id<Link>, usize>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: Id<Node>,
    pub x: f64,
    pub y: f64,
    pub in_links: Vec<Id<Link>>,
    pub out_links: Vec<Id<Link>>,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: Id<Link>,
    pub from: Id<Node>,
    pub to: Id<Node>,
    pub length: f64,
    pub freespeed: f64,
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    pub fn add_node(&mut self, node: Node) {
        assert!(
            !self.node_index.contains_key(&node.id),
            "Node id {} already exists.",
            node.id
        );
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    pub fn add_link(&mut self, link: Link) {
        assert!(
            !self.link_index.contains_key(&link.id),
            "Link id {} already exists.",
            link.id
        );

        // wire up in and out links and push link to the links vec
        let from = self.node_slot(&link.from);
        self.nodes[from].out_links.push(link.id.clone());
        let to = self.node_slot(&link.to);
        self.nodes[to].in_links.push(link.id.clone());

        self.link_index.insert(link.id.clone(), self.links.len());
        self.links.push(link);
    }

    pub fn get_node(&self, id: &Id<Node>) -> &Node {
        &self.nodes[self.node_slot(id)]
    }

    pub fn get_link(&self, id: &Id<Link>) -> &Link {
        self.try_get_link(id)
            .unwrap_or_else(|| panic!("Link {id} is not part of the network."))
    }

    pub fn try_get_link(&self, id: &Id<Link>) -> Option<&Link> {
        self.link_index.get(id).map(|i| &self.links[*i])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Links leaving the to-node of the given link.
    pub fn out_links(&self, link: &Link) -> &[Id<Link>] {
        &self.get_node(&link.to).out_links
    }

    /// Free speed travel time in whole seconds, at least one second.
    pub fn link_travel_time(&self, id: &Id<Link>) -> u32 {
        self.get_link(id).free_speed_travel_time()
    }

    /// Links are located at the midpoint of their nodes.
    pub fn link_coord(&self, id: &Id<Link>) -> (f64, f64) {
        let link = self.get_link(id);
        let from = self.get_node(&link.from);
        let to = self.get_node(&link.to);
        ((from.x + to.x) / 2., (from.y + to.y) / 2.)
    }

    fn node_slot(&self, id: &Id<Node>) -> usize {
        *self
            .node_index
            .get(id)
            .unwrap_or_else(|| panic!("Node {id} is not part of the network."))
    }
}

impl Node {
    pub fn new(id: Id<Node>, x: f64, y: f64) -> Self {
        Node {
            id,
            x,
            y,
            in_links: Vec::new(),
            out_links: Vec::new(),
        }
    }
}

impl Link {
    pub fn new(id: Id<Link>, from: Id<Node>, to: Id<Node>, length: f64, freespeed: f64) -> Self {
        Link {
            id,
            from,
            to,
            length,
            freespeed,
        }
    }

    pub fn new_with_default(id: Id<Link>, from: &Node, to: &Node) -> Self {
        // compute euclidean distance between from and to node
        let length = ((from.x - to.x).powi(2) + (from.y - to.y).powi(2)).sqrt();
        Link::new(id, from.id.clone(), to.id.clone(), length, 1.)
    }

    pub fn free_speed_travel_time(&self) -> u32 {
        let tt = (self.length / self.freespeed).ceil();
        (tt as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::id::Id;
    use crate::simulation::network::{Link, Network, Node};
    use assert_approx_eq::assert_approx_eq;

    fn two_node_network(prefix: &str) -> Network {
        let mut network = Network::new();
        let n1 = Node::new(Id::create(&format!("{prefix}-n1")), 0., 0.);
        let n2 = Node::new(Id::create(&format!("{prefix}-n2")), 100., 0.);
        network.add_node(n1);
        network.add_node(n2);
        network.add_link(Link::new(
            Id::create(&format!("{prefix}-l1")),
            Id::get_from_ext(&format!("{prefix}-n1")),
            Id::get_from_ext(&format!("{prefix}-n2")),
            100.,
            10.,
        ));
        network
    }

    #[test]
    fn add_link_wires_nodes() {
        let network = two_node_network("net-wire");
        let link_id: Id<Link> = Id::get_from_ext("net-wire-l1");
        let from = network.get_node(&Id::get_from_ext("net-wire-n1"));
        let to = network.get_node(&Id::get_from_ext("net-wire-n2"));

        assert_eq!(vec![link_id.clone()], from.out_links);
        assert_eq!(vec![link_id], to.in_links);
        assert!(from.in_links.is_empty());
    }

    #[test]
    #[should_panic]
    fn add_link_reject_duplicate() {
        let mut network = two_node_network("net-dup");
        network.add_link(Link::new(
            Id::get_from_ext("net-dup-l1"),
            Id::get_from_ext("net-dup-n1"),
            Id::get_from_ext("net-dup-n2"),
            1.,
            1.,
        ));
    }

    #[test]
    fn travel_time_and_coord() {
        let network = two_node_network("net-tt");
        let id = Id::get_from_ext("net-tt-l1");
        assert_eq!(10, network.link_travel_time(&id));
        let (x, y) = network.link_coord(&id);
        assert_approx_eq!(50., x);
        assert_approx_eq!(0., y);
    }

    #[test]
    fn travel_time_is_at_least_one_second() {
        let from = Node::new(Id::create("net-short-n1"), 0., 0.);
        let to = Node::new(Id::create("net-short-n2"), 0.5, 0.);
        let mut link = Link::new_with_default(Id::create("net-short-l1"), &from, &to);
        link.freespeed = 100.;
        assert_eq!(1, link.free_speed_travel_time());
    }
}
