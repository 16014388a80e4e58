fn main() {
    workmesh::app::startup::startup();
}
